use serde_json::json;
use url::Url;

/// How a response body is written to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    /// Compact single-line JSON instead of pretty-printed
    pub raw: bool,
    /// Wrap the body with the HTTP status and response headers
    pub include: bool,
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Joins `path` onto the API base URL and appends the query pairs.
pub fn build_url(api_url: &str, path: &str, query: &[(&str, String)]) -> Result<Url, String> {
    let mut url = Url::parse(&format!("{}{path}", api_url.trim_end_matches('/')))
        .map_err(|e| format!("Invalid URL: {api_url}{path}: {e}"))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx)
pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

fn print_json(value: &serde_json::Value, raw: bool, to_stderr: bool) {
    let formatted = if raw {
        value.to_string()
    } else {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    };
    if to_stderr {
        eprintln!("{formatted}");
    } else {
        println!("{formatted}");
    }
}

/// Execute a GET against the API, print the response, return a structured exit code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    path: &str,
    query: &[(&str, String)],
    output: Output,
) -> i32 {
    let url = match build_url(api_url, path, query) {
        Ok(url) => url,
        Err(message) => {
            print_json(&json!({ "error": "cli_error", "message": message }), output.raw, true);
            return 4;
        }
    };

    let resp = match client().get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check BASTION_API_URL."
            });
            print_json(&err, output.raw, true);
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = exit_code_for(status);

    // Collect headers before consuming response
    let headers: serde_json::Map<String, serde_json::Value> = if output.include {
        resp.headers()
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or("<binary>"))))
            .collect()
    } else {
        serde_json::Map::new()
    };

    let resp_body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    let body = if output.include {
        json!({
            "status": status,
            "headers": headers,
            "body": resp_body
        })
    } else {
        resp_body
    };

    print_json(&body, output.raw, exit_code != 0);
    exit_code
}
