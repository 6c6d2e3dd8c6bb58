use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{ChargeRequest, ChargeSession, PaymentGateway, RefundRequest};
use crate::models::GatewayEvent;

/// REST client for the hosted payment provider. Card data never passes through here.
pub struct HttpGateway {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn read_json(resp: reqwest::Response, what: &str) -> anyhow::Result<serde_json::Value> {
        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {what} response"))?;

        if !status.is_success() {
            let message = data["error"].as_str().unwrap_or("unknown error");
            anyhow::bail!("gateway {what} error ({status}): {message}");
        }
        Ok(data)
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeSession> {
        let body = json!({
            "amount": req.amount,
            "booking_id": req.booking_id,
            "user_id": req.user_id,
            "description": req.description,
        });

        let resp = self
            .client
            .post(format!("{}/charges", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &req.idempotency_key)
            .json(&body)
            .send()
            .await
            .context("failed to call payment gateway")?;

        let data = Self::read_json(resp, "charge").await?;
        let reference = data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing charge id in gateway response"))?;

        Ok(ChargeSession {
            reference,
            checkout_url: data["checkout_url"].as_str().map(|s| s.to_string()),
        })
    }

    async fn refund(&self, req: &RefundRequest) -> anyhow::Result<String> {
        let body = json!({
            "amount": req.amount,
            "booking_id": req.booking_id,
            "charges": req.charge_refs,
        });

        let resp = self
            .client
            .post(format!("{}/refunds", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &req.refund_id)
            .json(&body)
            .send()
            .await
            .context("failed to call payment gateway")?;

        let data = Self::read_json(resp, "refund").await?;
        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing refund id in gateway response"))
    }

    async fn fetch_charge(&self, reference: &str) -> anyhow::Result<Option<GatewayEvent>> {
        let resp = self
            .client
            .get(format!("{}/charges/{}", self.base_url, reference))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("failed to call payment gateway")?;

        let data = Self::read_json(resp, "charge lookup").await?;
        let event = match data["status"].as_str() {
            Some("succeeded") => Some(GatewayEvent::ChargeSucceeded {
                reference: reference.to_string(),
                amount: data["amount"]
                    .as_i64()
                    .ok_or_else(|| anyhow::anyhow!("missing amount in gateway response"))?,
            }),
            Some("failed") => Some(GatewayEvent::ChargeFailed {
                reference: reference.to_string(),
                reason: data["failure_reason"]
                    .as_str()
                    .unwrap_or("declined")
                    .to_string(),
            }),
            _ => None,
        };
        Ok(event)
    }
}
