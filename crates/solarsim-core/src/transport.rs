//! The `Transport` trait, the seam between typed BRP calls and the wire.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{FetchError, FetchResult, FetchSuccess};
use crate::request::{BrpParams, BrpRequest, BrpResponse};

/// Something that can carry one JSON body to the remote server.
///
/// Implementations must classify every failure into a [`FetchError`] and
/// never panic; callers branch on the returned [`FetchResult`] only.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` so they can be shared with poller
/// tasks behind an `Arc`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// POST `body` and return the status plus the parsed JSON reply.
    async fn post(&self, body: Value) -> FetchResult<Value>;

    /// The endpoint this transport talks to.
    fn url(&self) -> &str;

    /// Send a typed request and decode the reply into the method's
    /// response shape.
    ///
    /// A 2xx reply that does not match the shape is reported as
    /// `InvalidContent`; a request that cannot be encoded as `Unknown`.
    async fn send<P: BrpParams>(
        &self,
        request: &BrpRequest<P>,
    ) -> FetchResult<BrpResponse<P::Result>> {
        let body = serde_json::to_value(request).map_err(|e| {
            FetchError::unknown(format!("failed to encode {} request: {e}", P::METHOD))
        })?;
        let reply = self.post(body).await?;
        decode_reply::<P>(reply)
    }
}

fn decode_reply<P: BrpParams>(
    reply: FetchSuccess<Value>,
) -> FetchResult<BrpResponse<P::Result>> {
    let FetchSuccess { status, data } = reply;
    match BrpResponse::<P::Result>::deserialize(&data) {
        Ok(response) => Ok(FetchSuccess {
            status,
            data: response,
        }),
        Err(e) => {
            tracing::debug!(method = %P::METHOD, error = %e, "reply does not match response shape");
            Err(FetchError::invalid_content(
                format!("Unexpected {} response: {e}", P::METHOD),
                data.to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use crate::request::{GetResources, MutateResources};
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a canned outcome and records the last body it saw.
    struct CannedTransport {
        reply: FetchResult<Value>,
        seen: Mutex<Option<Value>>,
    }

    impl CannedTransport {
        fn new(reply: FetchResult<Value>) -> Self {
            Self {
                reply,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn post(&self, body: Value) -> FetchResult<Value> {
            *self.seen.lock().unwrap() = Some(body);
            self.reply.clone()
        }

        fn url(&self) -> &str {
            "canned://"
        }
    }

    fn get_request() -> BrpRequest<GetResources> {
        BrpRequest::new(
            0,
            GetResources {
                resource: "X".into(),
            },
        )
    }

    #[tokio::test]
    async fn typed_send_decodes_result() {
        let transport = CannedTransport::new(Ok(FetchSuccess {
            status: 200,
            data: json!({ "id": 0, "jsonrpc": "2.0", "result": { "value": 1 } }),
        }));

        let reply = transport.send(&get_request()).await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.data.id, json!(0));
        assert_eq!(reply.data.result.unwrap().value, json!(1));

        let seen = transport.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen["method"], "world.get_resources");
        assert_eq!(seen["params"]["resource"], "X");
    }

    #[tokio::test]
    async fn shape_mismatch_is_invalid_content() {
        let transport = CannedTransport::new(Ok(FetchSuccess {
            status: 200,
            data: json!({ "id": 0, "jsonrpc": "2.0", "result": { "nope": true } }),
        }));

        let err = transport.send(&get_request()).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::InvalidContent);
        assert!(err.message.contains("world.get_resources"));
        assert!(err.details.unwrap().as_str().contains("nope"));
    }

    #[tokio::test]
    async fn mismatch_details_carry_the_whole_reply() {
        let reply = json!({ "id": 3, "jsonrpc": "2.0", "result": [1, 2, 3] });
        let transport = CannedTransport::new(Ok(FetchSuccess {
            status: 200,
            data: reply.clone(),
        }));

        let err = transport.send(&get_request()).await.unwrap_err();
        let details: Value = serde_json::from_str(err.details.unwrap().as_str()).unwrap();
        assert_eq!(details, reply);
    }

    #[tokio::test]
    async fn transport_failure_passes_through() {
        let transport = CannedTransport::new(Err(FetchError::timeout(10_000)));
        let request = BrpRequest::new(
            1,
            MutateResources {
                resource: "X".into(),
                path: ".a".into(),
                value: json!(1),
            },
        );
        let err = transport.send(&request).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Timeout);
    }
}
