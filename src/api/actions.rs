use reqwest::Method;
use serde_json::Value;

use super::client::{ApiClient, Envelope};
use crate::error::ActionError;
use crate::models::InstanceAction;

/// Issue a start/stop/reboot command for one instance. The call returns as
/// soon as the API accepts the request; the actual state change is
/// asynchronous and only observable through later describe calls.
pub(crate) async fn send_action(
    client: &ApiClient,
    region: &str,
    id: &str,
    action: InstanceAction,
) -> Result<(), ActionError> {
    let endpoint = format!("/v1/instances/{}/{}", id, action.as_str());
    let params = [("region", region.to_string())];
    let envelope: Envelope<Value> = client
        .request(Method::POST, &endpoint, &params, None)
        .await
        .map_err(ActionError::Api)?;
    if envelope.code == "OKAY" {
        Ok(())
    } else {
        Err(ActionError::Denied(envelope.reason()))
    }
}
