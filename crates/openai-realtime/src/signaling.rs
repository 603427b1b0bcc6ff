//! The HTTP offer/answer exchange with the realtime endpoint.

use crate::error::{NegotiationError, Result};
use crate::peer::{SdpKind, SessionDescription};
use crate::token::EphemeralKey;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use s2s_core::S2sModel;
use tracing::{info, instrument};

pub const DEFAULT_REALTIME_URL: &str = "https://api.openai.com/v1/realtime";

/// Exchanges a local offer for the remote answer.
#[async_trait]
pub trait Signaling: Send + Sync {
    async fn exchange(
        &self,
        model: S2sModel,
        key: &EphemeralKey,
        offer: &SessionDescription,
    ) -> Result<SessionDescription>;
}

/// Posts the offer SDP to `<url>?model=<model>` with the short-lived credential.
pub struct HttpSignaling {
    client: reqwest::Client,
    url: String,
}

impl HttpSignaling {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    #[instrument(skip_all, fields(url = %self.url, %model))]
    async fn exchange(
        &self,
        model: S2sModel,
        key: &EphemeralKey,
        offer: &SessionDescription,
    ) -> Result<SessionDescription> {
        if offer.kind != SdpKind::Offer {
            return Err(NegotiationError::Peer(
                "only offers can be signaled".to_string(),
            ));
        }

        let response = self
            .client
            .post(&self.url)
            .query(&[("model", model.as_str())])
            .header(AUTHORIZATION, format!("Bearer {}", key.expose()))
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer.sdp.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NegotiationError::Signaling {
                status: status.as_u16(),
            });
        }

        let sdp = response.text().await?;
        if !sdp.trim_start().starts_with("v=") {
            return Err(NegotiationError::MalformedRemoteDescription(
                "answer body is not an SDP document".to_string(),
            ));
        }
        info!(bytes = sdp.len(), "Received session answer");
        Ok(SessionDescription::answer(sdp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OFFER: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\n";
    const ANSWER: &str = "v=0\r\no=- 3 4 IN IP4 10.0.0.1\r\ns=-\r\n";

    fn signaling(server: &MockServer) -> HttpSignaling {
        HttpSignaling::new(reqwest::Client::new(), format!("{}/v1/realtime", server.uri()))
    }

    #[tokio::test]
    async fn test_exchange_posts_offer_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime"))
            .and(query_param("model", "gpt-realtime"))
            .and(header("authorization", "Bearer ek_123"))
            .and(header("content-type", "application/sdp"))
            .and(body_string(OFFER))
            .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER))
            .expect(1)
            .mount(&server)
            .await;

        let answer = signaling(&server)
            .exchange(
                S2sModel::GptRealtime,
                &EphemeralKey::new("ek_123"),
                &SessionDescription::offer(OFFER),
            )
            .await
            .unwrap();

        assert_eq!(answer, SessionDescription::answer(ANSWER));
    }

    #[tokio::test]
    async fn test_exchange_fails_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = signaling(&server)
            .exchange(
                S2sModel::GptRealtime,
                &EphemeralKey::new("expired"),
                &SessionDescription::offer(OFFER),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::Signaling { status: 401 }));
    }

    #[tokio::test]
    async fn test_exchange_rejects_non_sdp_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let err = signaling(&server)
            .exchange(
                S2sModel::GptRealtime,
                &EphemeralKey::new("ek"),
                &SessionDescription::offer(OFFER),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::MalformedRemoteDescription(_)));
    }
}
