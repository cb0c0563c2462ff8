use crate::util::{Output, api_request};

pub async fn run(api_url: &str, output: Output) -> i32 {
    api_request(api_url, "/health", &[], output).await
}

pub async fn classifier(api_url: &str, output: Output) -> i32 {
    api_request(api_url, "/v1/admin/classifier/health", &[], output).await
}
