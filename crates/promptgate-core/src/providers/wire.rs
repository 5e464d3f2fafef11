//! Shared HTTP plumbing for the provider adapters

use super::error::ProviderError;
use serde_json::Value;

/// POST a JSON body and return the parsed JSON response.
///
/// Non-success statuses become classified [`ProviderError`]s with the parsed
/// error body attached; transport failures are classified by
/// [`ProviderError::from_transport`].
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &Value,
) -> Result<Value, ProviderError> {
    let mut request = client.post(url).json(body);
    for (name, value) in headers {
        request = request.header(*name, value.as_str());
    }

    let response = request.send().await.map_err(ProviderError::from_transport)?;
    let status = response.status();

    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|err| ProviderError::terminal(format!("response body is not valid JSON: {}", err)));
    }

    let error_body = response.json::<Value>().await.ok();
    Err(ProviderError::from_status(status.as_u16(), error_body.as_ref()))
}

/// Read a string field off a response object, tolerating absence.
pub(crate) fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}
