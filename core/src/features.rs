use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of features produced per request.
pub const FEATURE_ARITY: usize = 5;

pub const ADDRESS_INDEX: usize = 0;
pub const METHOD_INDEX: usize = 1;
pub const PATH_LENGTH_INDEX: usize = 2;
pub const STATUS_INDEX: usize = 3;
pub const RESPONSE_TIME_INDEX: usize = 4;

/// Fixed-arity numeric encoding of one request, in the order the anomaly
/// classifier was trained on:
/// `[address, method, path_length, status_code, response_time_ms]`.
///
/// Serializes as a plain JSON array so it can be dropped straight into the
/// classifier's `features` matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector([f64; FEATURE_ARITY]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_ARITY]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn response_time_ms(&self) -> f64 {
        self.0[RESPONSE_TIME_INDEX]
    }
}

/// What the pipeline knows about a request once the handler has answered.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub address: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub status_code: u16,
    /// Time since the request entered the pipeline.
    pub elapsed: Duration,
}

pub fn extract_features(ctx: &RequestContext<'_>) -> FeatureVector {
    FeatureVector([
        encode_address(ctx.address),
        encode_method(ctx.method),
        ctx.path.chars().count() as f64,
        f64::from(ctx.status_code),
        ctx.elapsed.as_secs_f64() * 1000.0,
    ])
}

/// IPv4 octets as a big-endian u32. Anything that is not an IPv4 address
/// (including IPv6 and garbage) encodes to `0.0`.
pub fn encode_address(address: &str) -> f64 {
    let v4 = match address.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4,
        // Dual-stack listeners report IPv4 peers as ::ffff:a.b.c.d
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4,
            None => return 0.0,
        },
        Err(_) => return 0.0,
    };
    f64::from(u32::from(v4))
}

pub fn encode_method(method: &str) -> f64 {
    match method {
        "GET" => 1.0,
        "POST" => 2.0,
        "PUT" => 3.0,
        "DELETE" => 4.0,
        "PATCH" => 5.0,
        _ => 0.0,
    }
}
