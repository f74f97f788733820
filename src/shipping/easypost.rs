//! EasyPost REST client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

use super::{PurchasedLabel, Rate, Shipment, ShippingGateway, TrackingDetail, TrackingInfo};
use crate::domain::aggregates::Address;
use crate::domain::value_objects::Parcel;
use crate::{Result, ServiceError};

const DEFAULT_BASE_URL: &str = "https://api.easypost.com/v2";

pub struct EasyPostClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl EasyPostClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, api_key: api_key.into(), base_url: DEFAULT_BASE_URL.to_string() })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(format!("{}{}", self.base_url, path)).basic_auth(&self.api_key, None::<&str>)
    }

    async fn read<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body).map(|e| e.error.message).unwrap_or_else(|_| body.chars().take(200).collect());
            error!(operation = %operation, status = %status, message = %message, "EasyPost request failed");
            return Err(ServiceError::UpstreamFailure(format!("EasyPost {operation} failed ({status}): {message}")));
        }
        debug!(operation = %operation, status = %status, "EasyPost request succeeded");
        serde_json::from_str(&body).map_err(|e| ServiceError::UpstreamFailure(format!("EasyPost {operation} returned malformed JSON: {e}")))
    }
}

#[derive(Deserialize)] struct ApiError { error: ApiErrorBody }
#[derive(Deserialize)] struct ApiErrorBody { message: String }

#[derive(Deserialize)]
struct ShipmentBody {
    id: String,
    #[serde(default)]
    rates: Vec<RateBody>,
    #[serde(default)]
    messages: Vec<MessageBody>,
    tracking_code: Option<String>,
    postage_label: Option<LabelBody>,
    selected_rate: Option<RateBody>,
    tracker: Option<TrackerLink>,
}

#[derive(Deserialize)]
struct RateBody { id: String, carrier: String, service: String, rate: Decimal, delivery_days: Option<i32> }
#[derive(Deserialize)] struct MessageBody { carrier: Option<String>, message: String }
#[derive(Deserialize)] struct LabelBody { label_url: String }
#[derive(Deserialize)] struct TrackerLink { public_url: Option<String> }

#[derive(Deserialize)]
struct TrackerBody {
    tracking_code: String,
    carrier: Option<String>,
    status: String,
    public_url: Option<String>,
    est_delivery_date: Option<String>,
    #[serde(default)]
    tracking_details: Vec<DetailBody>,
}

#[derive(Deserialize)] struct DetailBody { message: Option<String>, status: Option<String>, datetime: Option<String> }

impl From<RateBody> for Rate {
    fn from(r: RateBody) -> Self { Rate { id: r.id, carrier: r.carrier, service: r.service, rate: r.rate, delivery_days: r.delivery_days } }
}

#[async_trait]
impl ShippingGateway for EasyPostClient {
    async fn create_shipment(&self, to: &Address, from: &Address, parcel: &Parcel) -> Result<Shipment> {
        let body = json!({ "shipment": { "to_address": to, "from_address": from, "parcel": parcel } });
        let response = self.post("/shipments").json(&body).send().await?;
        let shipment: ShipmentBody = Self::read("create_shipment", response).await?;
        Ok(Shipment {
            id: shipment.id,
            rates: shipment.rates.into_iter().map(Rate::from).collect(),
            messages: shipment.messages.into_iter().map(|m| match m.carrier { Some(c) => format!("{c}: {}", m.message), None => m.message }).collect(),
        })
    }

    async fn buy_label(&self, shipment_id: &str, rate_id: &str) -> Result<PurchasedLabel> {
        let response = self.post(&format!("/shipments/{shipment_id}/buy")).json(&json!({ "rate": { "id": rate_id } })).send().await?;
        let bought: ShipmentBody = Self::read("buy_label", response).await?;
        let rate = bought.selected_rate.ok_or_else(|| ServiceError::UpstreamFailure("EasyPost purchase returned no selected rate".into()))?;
        Ok(PurchasedLabel {
            shipment_id: bought.id,
            tracking_code: bought.tracking_code.ok_or_else(|| ServiceError::UpstreamFailure("EasyPost purchase returned no tracking code".into()))?,
            label_url: bought.postage_label.map(|l| l.label_url).ok_or_else(|| ServiceError::UpstreamFailure("EasyPost purchase returned no label".into()))?,
            tracking_url: bought.tracker.and_then(|t| t.public_url),
            carrier: rate.carrier,
            service: rate.service,
            rate: rate.rate,
        })
    }

    async fn track(&self, tracking_code: &str, carrier: Option<&str>) -> Result<TrackingInfo> {
        let body = json!({ "tracker": { "tracking_code": tracking_code, "carrier": carrier } });
        let response = self.post("/trackers").json(&body).send().await?;
        let tracker: TrackerBody = Self::read("track", response).await?;
        Ok(TrackingInfo {
            tracking_code: tracker.tracking_code,
            carrier: tracker.carrier,
            status: tracker.status,
            public_url: tracker.public_url,
            est_delivery_date: tracker.est_delivery_date,
            details: tracker.tracking_details.into_iter().map(|d| TrackingDetail { message: d.message, status: d.status, datetime: d.datetime }).collect(),
        })
    }
}
