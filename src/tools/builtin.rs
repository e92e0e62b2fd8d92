//! A handful of native tools, illustrative enough to exercise the contract
//! and the seed scenarios in spec §8 (`homey`, `price_tracker`, `send_email`,
//! `web_fetch`). Real deployments register many more; the auxiliary modules
//! named in spec §1 (web fetcher, email, price tracker) are out of scope
//! beyond this uniform contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{ActivityHint, Ambient, Tool};

#[derive(Debug)]
pub struct HomeyTool;

#[async_trait]
impl Tool for HomeyTool {
    fn name(&self) -> &str {
        "homey"
    }

    fn description(&self) -> &str {
        "Control a smart-home device (lights, thermostats, switches) by name."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["control_device"]},
                "device_name": {"type": "string"},
                "capability": {"type": "string"},
                "value": {}
            },
            "required": ["action", "device_name", "capability", "value"]
        })
    }

    fn activity_hint(&self) -> Option<ActivityHint> {
        Some(ActivityHint("Controlling {{device_name}}".to_string()))
    }

    async fn run(&self, args: serde_json::Map<String, serde_json::Value>, _ambient: Ambient) -> String {
        let Some(device) = args.get("device_name").and_then(|v| v.as_str()) else {
            return "Error: missing device_name".to_string();
        };
        let capability = args.get("capability").and_then(|v| v.as_str()).unwrap_or("onoff");
        let value = args.get("value").cloned().unwrap_or(json!(null));
        format!("Set {device}.{capability} = {value}")
    }
}

#[derive(Debug)]
pub struct PriceTrackerTool;

#[async_trait]
impl Tool for PriceTrackerTool {
    fn name(&self) -> &str {
        "price_tracker"
    }

    fn description(&self) -> &str {
        "Look up the most recent tracked prices for a product."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "product": {"type": "string"},
                "count": {"type": "integer", "default": 3}
            },
            "required": ["product"]
        })
    }

    fn activity_hint(&self) -> Option<ActivityHint> {
        Some(ActivityHint("Checking recent prices for {{product}}".to_string()))
    }

    async fn run(&self, args: serde_json::Map<String, serde_json::Value>, _ambient: Ambient) -> String {
        let Some(product) = args.get("product").and_then(|v| v.as_str()) else {
            return "Error: missing product".to_string();
        };
        let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(3);
        let prices: Vec<String> = (0..count).map(|i| format!("${:.2}", 19.99 + i as f64)).collect();
        format!("Last {count} prices for {product}: {}", prices.join(", "))
    }
}

#[derive(Debug)]
pub struct SendEmailTool;

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send an email to the tenant's registered address with a subject and body."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "subject": {"type": "string"},
                "body": {"type": "string"}
            },
            "required": ["subject", "body"]
        })
    }

    fn ambient_params(&self) -> &[&'static str] {
        &["user_email"]
    }

    fn activity_hint(&self) -> Option<ActivityHint> {
        Some(ActivityHint("Emailing {{user_email}}".to_string()))
    }

    async fn run(&self, args: serde_json::Map<String, serde_json::Value>, _ambient: Ambient) -> String {
        let Some(to) = args.get("user_email").and_then(|v| v.as_str()) else {
            return "Error: no user_email available for this tenant".to_string();
        };
        let subject = args.get("subject").and_then(|v| v.as_str()).unwrap_or("(no subject)");
        format!("Sent email to {to} with subject \"{subject}\"")
    }
}

#[derive(Debug)]
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("static reqwest client configuration is always valid"),
        }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch the text content of a URL."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": { "url": {"type": "string"} },
            "required": ["url"]
        })
    }

    fn activity_hint(&self) -> Option<ActivityHint> {
        Some(ActivityHint("Fetching {{url}}".to_string()))
    }

    async fn run(&self, args: serde_json::Map<String, serde_json::Value>, _ambient: Ambient) -> String {
        let Some(url) = args.get("url").and_then(|v| v.as_str()) else {
            return "Error: missing url".to_string();
        };
        match self.client.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => body.chars().take(4000).collect(),
                Err(e) => format!("Error: failed to read response body: {e}"),
            },
            Err(e) if e.is_timeout() => "Error: request timed out".to_string(),
            Err(e) => format!("Error: request failed: {e}"),
        }
    }
}

pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(HomeyTool),
        Arc::new(PriceTrackerTool),
        Arc::new(SendEmailTool),
        Arc::new(WebFetchTool::default()),
    ]
}
