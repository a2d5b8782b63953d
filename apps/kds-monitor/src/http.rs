//! HTTP implementation of the orders API.
//!
//! ```text
//! GET   {api}/api/v1/orders               ──► full order list
//! PATCH {api}/api/v1/orders/{id}/status   ◄── { "status": "ready" }
//! ```
//!
//! Bodies use the same snake_case wire vocabulary as socket frames and go
//! through the same key conversion.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::debug;

use kds_core::{Order, OrderStatus};
use kds_sync::codec::{keys_to_camel, keys_to_snake};
use kds_sync::{OrdersApi, SyncError, SyncResult};

const TENANT_HEADER: &str = "x-restaurant-id";

#[derive(Clone)]
pub struct HttpOrdersApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    tenant_id: Option<String>,
}

impl HttpOrdersApi {
    pub fn new(base_url: String, token: Option<String>, tenant_id: Option<String>) -> Self {
        HttpOrdersApi {
            client: Client::new(),
            base_url,
            token,
            tenant_id,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(tenant_id) = &self.tenant_id {
            builder = builder.header(TENANT_HEADER, tenant_id);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> SyncResult<Response> {
        let resp = builder.send().await.map_err(request_failed)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SyncError::ApiRequestFailed(format!("{}: {}", status, text)));
        }
        Ok(resp)
    }
}

#[async_trait]
impl OrdersApi for HttpOrdersApi {
    async fn get_orders(&self) -> SyncResult<Vec<Order>> {
        let resp = self.send(self.request(Method::GET, "/api/v1/orders")).await?;
        let body: Value = resp.json().await.map_err(request_failed)?;
        let orders = parse_orders(&body)?;
        debug!(count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> SyncResult<()> {
        let path = format!("/api/v1/orders/{}/status", id);
        let body = keys_to_snake(&json!({ "status": status }));
        self.send(self.request(Method::PATCH, &path).json(&body)).await?;
        Ok(())
    }
}

fn request_failed(err: reqwest::Error) -> SyncError {
    SyncError::ApiRequestFailed(err.to_string())
}

/// Accepts either a bare array or `{ "orders": [...] }`.
fn parse_orders(body: &Value) -> SyncResult<Vec<Order>> {
    let body = keys_to_camel(body);
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => map
            .remove("orders")
            .ok_or_else(|| SyncError::InvalidMessage("orders response has no order list".into()))?,
        other => {
            return Err(SyncError::InvalidMessage(format!(
                "unexpected orders response: {}",
                other
            )))
        }
    };
    Ok(serde_json::from_value(list)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_order(id: &str) -> Value {
        json!({
            "id": id,
            "order_number": "A-101",
            "status": "preparing",
            "table_number": "12",
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-05-01T12:05:00Z"
        })
    }

    #[test]
    fn test_parse_bare_array() {
        let orders = parse_orders(&json!([wire_order("o1"), wire_order("o2")])).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_number, "A-101");
        assert_eq!(orders[0].table_number.as_deref(), Some("12"));
        assert_eq!(orders[0].status, OrderStatus::Preparing);
    }

    #[test]
    fn test_parse_wrapped_list() {
        let orders = parse_orders(&json!({ "orders": [wire_order("o1")] })).unwrap();
        assert_eq!(orders[0].id, "o1");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert!(matches!(
            parse_orders(&json!({ "data": [] })),
            Err(SyncError::InvalidMessage(_))
        ));
        assert!(matches!(
            parse_orders(&json!("nope")),
            Err(SyncError::InvalidMessage(_))
        ));
    }
}
