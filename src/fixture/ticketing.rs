//! Built-in ticketing fixtures
//!
//! `create_event` creates, prices and publishes an event; `create_paid_cart`
//! buys tickets for such an event as the end user. Request shapes follow the
//! ticketing API's `/events`, `/events/{id}/ticket_types`, `/cart` and
//! `/cart/checkout` resources.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::common::Result;
use crate::http::{RequestTemplate, StatusClass};

use super::{Fixture, FixtureCall, FixtureContext, Orchestrator, Outputs, Params};

pub const CREATE_EVENT: &str = "create_event";
pub const CREATE_PAID_CART: &str = "create_paid_cart";

const DEFAULT_EVENT_NAME: &str = "Conformance event";
const DEFAULT_CARD_TOKEN: &str = "tok_visa";

/// Register every built-in fixture
pub fn register(orchestrator: &mut Orchestrator) {
    orchestrator.register(CreateEvent);
    orchestrator.register(CreatePaidCart);
}

/// Create a published event with one general-admission ticket type
///
/// Params: `name` (event name), `capacity` (default 100),
/// `price_in_cents` (default 3000).
pub struct CreateEvent;

#[async_trait]
impl Fixture for CreateEvent {
    fn name(&self) -> &str {
        CREATE_EVENT
    }

    fn description(&self) -> &str {
        "Create and publish an event with a general-admission ticket type"
    }

    fn required_keys(&self) -> Vec<String> {
        vec![
            "org_member_token".to_string(),
            "organization_id".to_string(),
            "venue_id".to_string(),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["event_id".to_string(), "ticket_type_id".to_string()]
    }

    async fn build(&self, ctx: &FixtureContext, params: &Params) -> Result<Outputs> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_EVENT_NAME);
        let capacity = params.get("capacity").cloned().unwrap_or(json!(100));
        let price = params.get("price_in_cents").cloned().unwrap_or(json!(3000));

        let create = RequestTemplate::post("/events").auth("org_member").json(json!({
            "name": name,
            "organization_id": "{{organization_id}}",
            "venue_id": "{{venue_id}}",
            "event_start": "2059-11-13T12:00:00",
            "door_time": "2059-11-13T11:00:00",
            "age_limit": 18
        }));
        let response = ctx.request("create event", &create, StatusClass::Success).await?;
        ctx.set("event_id", ctx.extract("create event", &response, "/id")?);

        let ticket_type = RequestTemplate::post("/events/{{event_id}}/ticket_types")
            .auth("org_member")
            .json(json!({
                "name": "General Admission",
                "capacity": capacity,
                "start_date": "2017-11-21T00:00:00",
                "end_date": "8999-01-10T02:22:00",
                "visibility": "Always",
                "limit_per_person": 0,
                "ticket_pricing": [{
                    "name": "Standard",
                    "price_in_cents": price,
                    "start_date": "2017-11-21T00:00:00",
                    "end_date": "8999-01-10T02:22:00"
                }]
            }));
        let response = ctx
            .request("create ticket type", &ticket_type, StatusClass::Success)
            .await?;
        ctx.set(
            "ticket_type_id",
            ctx.extract("create ticket type", &response, "/id")?,
        );

        let publish = RequestTemplate::post("/events/{{event_id}}/publish").auth("org_member");
        ctx.request("publish event", &publish, StatusClass::Success)
            .await?;

        ctx.outputs(&["event_id", "ticket_type_id"])
    }
}

/// Buy tickets for a fresh event as the end user
///
/// Params: `event` (name passed to `create_event`), `quantity` (default 1).
/// Checkout pays with `{{card_token}}`, defaulting to a test card token.
pub struct CreatePaidCart;

#[async_trait]
impl Fixture for CreatePaidCart {
    fn name(&self) -> &str {
        CREATE_PAID_CART
    }

    fn description(&self) -> &str {
        "Create an event, fill a cart for it and check out"
    }

    fn dependencies(&self, params: &Params) -> Vec<FixtureCall> {
        let mut event = FixtureCall::new(CREATE_EVENT);
        if let Some(name) = params.get("event") {
            event = event.param("name", name.clone());
        }
        vec![event]
    }

    fn required_keys(&self) -> Vec<String> {
        vec!["user_token".to_string()]
    }

    fn outputs(&self) -> Vec<String> {
        ["event_id", "ticket_type_id", "cart_id", "order_id"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    async fn build(&self, ctx: &FixtureContext, params: &Params) -> Result<Outputs> {
        if !params.contains_key("quantity") {
            ctx.set("quantity", 1);
        }
        if !ctx.env().has("card_token") {
            ctx.set("card_token", DEFAULT_CARD_TOKEN);
        }

        let cart = RequestTemplate::post("/cart").auth("user").body(
            r#"{"items": [{"ticket_type_id": "{{ticket_type_id}}", "quantity": {{quantity}}}]}"#,
        );
        let response = ctx.request("fill cart", &cart, StatusClass::Success).await?;
        ctx.set("cart_id", ctx.extract("fill cart", &response, "/id")?);
        ctx.set(
            "cart_total_in_cents",
            ctx.extract("fill cart", &response, "/total_in_cents")?,
        );

        let checkout = RequestTemplate::post("/cart/checkout").auth("user").body(
            r#"{
    "amount": {{cart_total_in_cents}},
    "method": {
        "type": "Card",
        "provider": "stripe",
        "token": "{{card_token}}",
        "save_payment_method": false,
        "set_default": false
    }
}"#,
        );
        let response = ctx.request("checkout", &checkout, StatusClass::Success).await?;
        ctx.set("order_id", ctx.extract("checkout", &response, "/id")?);

        ctx.outputs(&["event_id", "ticket_type_id", "cart_id", "order_id"])
    }
}
