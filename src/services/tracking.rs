use super::{FieldErrors, TrackingError};
use crate::client::generate_visitor_id;
use crate::clock::Clock;
use crate::config::AnalyticsConfig;
use crate::directory::CatalogDirectory;
use crate::models::*;
use crate::store::EventStore;
use std::net::IpAddr;
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

// ============================================
// Tracking Service
// ============================================

/// Request metadata pulled out of the HTTP layer by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub ip: Option<String>,
    /// `visitor_id` cookie, only consulted for server-side events.
    pub visitor_cookie: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Recorded(AnalyticsEvent),
    /// Tracking is switched off; the request was accepted but nothing stored.
    Disabled,
}

pub struct TrackingService {
    store: Arc<dyn EventStore>,
    directory: Arc<dyn CatalogDirectory>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
}

impl TrackingService {
    pub fn new(
        store: Arc<dyn EventStore>,
        directory: Arc<dyn CatalogDirectory>,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            config,
        }
    }

    /// Validate a visitor submission and append it to the event log.
    pub async fn track(
        &self,
        input: &TrackEventRequest,
        meta: &RequestMeta,
    ) -> Result<TrackOutcome, TrackingError> {
        if !self.config.tracking_enabled {
            return Ok(TrackOutcome::Disabled);
        }

        let mut errors = match input.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => field_errors(&e),
        };

        if let Some(business_id) = input.business_id {
            if !errors.contains_key("business_id")
                && !self.directory.business_exists(business_id).await?
            {
                errors
                    .entry("business_id".into())
                    .or_default()
                    .push("The selected business_id is invalid.".into());
            }
        }

        if let Some(product_id) = input.product_id {
            if !self.directory.product_exists(product_id).await? {
                errors
                    .entry("product_id".into())
                    .or_default()
                    .push("The selected product_id is invalid.".into());
            }
        }

        // Every field is present and well-formed once `errors` is empty.
        let (Some(business_id), Some(event_type), Some(visitor_id)) = (
            input.business_id,
            input.event_type.as_deref().and_then(|v| v.parse::<EventType>().ok()),
            input.visitor_id.clone(),
        ) else {
            return Err(TrackingError::Validation(errors));
        };

        if !errors.is_empty() {
            return Err(TrackingError::Validation(errors));
        }

        let event = self
            .record(business_id, event_type, input.product_id, visitor_id, meta)
            .await?;

        Ok(TrackOutcome::Recorded(event))
    }

    /// Record an event raised by server code rather than a visitor's client.
    ///
    /// Called by host application code (inquiry and share handlers), not by
    /// the public tracking endpoint. Ids are trusted; the visitor falls back
    /// to the `visitor_id` cookie and then to a freshly generated id.
    pub async fn track_server_event(
        &self,
        business_id: i64,
        event_type: EventType,
        product_id: Option<i64>,
        meta: &RequestMeta,
    ) -> Result<TrackOutcome, TrackingError> {
        if !self.config.tracking_enabled {
            return Ok(TrackOutcome::Disabled);
        }

        let visitor_id = meta
            .visitor_cookie
            .clone()
            .filter(|v| !v.is_empty() && v.chars().count() <= 64)
            .unwrap_or_else(generate_visitor_id);

        let event = self
            .record(business_id, event_type, product_id, visitor_id, meta)
            .await?;

        Ok(TrackOutcome::Recorded(event))
    }

    async fn record(
        &self,
        business_id: i64,
        event_type: EventType,
        product_id: Option<i64>,
        visitor_id: String,
        meta: &RequestMeta,
    ) -> Result<AnalyticsEvent, TrackingError> {
        let device_type = DeviceType::from_user_agent(meta.user_agent.as_deref().unwrap_or(""));

        let referrer = meta
            .referrer
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|r| r.chars().take(MAX_REFERRER_LEN).collect::<String>());

        let ip_address = meta
            .ip
            .as_deref()
            .and_then(|raw| raw.trim().parse::<IpAddr>().ok())
            .map(|ip| {
                if self.config.anonymize_ip {
                    anonymize_ip(ip)
                } else {
                    ip.to_string()
                }
            });

        let event = self
            .store
            .append(NewAnalyticsEvent {
                business_id,
                product_id,
                event_type,
                visitor_id,
                device_type,
                referrer,
                ip_address,
                created_at: self.clock.now(),
            })
            .await?;

        tracing::debug!(
            event_id = event.id,
            business_id = event.business_id,
            event_type = %event.event_type,
            "Analytics event recorded"
        );

        Ok(event)
    }
}

/// Zero the host part of an address: last IPv4 octet, IPv6 beyond /48.
pub fn anonymize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            format!("{}.{}.{}.0", octets[0], octets[1], octets[2])
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            format!("{:x}:{:x}:{:x}::", segments[0], segments[1], segments[2])
        }
    }
}

fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();

    for (field, errs) in errors.field_errors() {
        let messages = out.entry(field.to_string()).or_default();
        for err in errs.iter() {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("The {} field is invalid ({}).", field, err.code));
            messages.push(message);
        }
    }

    out
}
