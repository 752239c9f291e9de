// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::bridge::Publisher;
use crate::protocol::{response_topic, MeasurementClass, ResendRequest, ResendResponse};
use crate::resend::ResendEngine;

/// Request/response interface for resend requests
pub struct ControlInterface {
    engine: Arc<ResendEngine>,
}

impl ControlInterface {
    pub fn new(engine: Arc<ResendEngine>) -> Self {
        Self { engine }
    }

    /// Run one resend request and build its response
    ///
    /// A payload that does not parse is answered without touching the store.
    pub async fn handle_request(&self, class: MeasurementClass, payload: &[u8]) -> ResendResponse {
        let request = match ResendRequest::parse(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected {} resend request: {}", class, e);
                return ResendResponse::error(e.to_string(), None);
            }
        };

        info!(
            "Processing {} resend request [{}, {}]",
            class, request.start_date, request.end_date
        );

        match self
            .engine
            .resend(class, request.start_date, request.end_date)
            .await
        {
            Ok(summary) => {
                info!(
                    "Resend request delivered {} {} record(s) from {} file(s)",
                    summary.delivered, class, summary.files
                );
                ResendResponse::success(
                    format!(
                        "Successfully resend {} data between {} and {}",
                        class,
                        format_epoch(request.start_date),
                        format_epoch(request.end_date)
                    ),
                    request.request_id,
                )
            }
            Err(e) => {
                error!("Fail to resend {} data: {}", class, e);
                ResendResponse::error(format!("Fail to resend: {}", e), request.request_id)
            }
        }
    }

    /// Handle a request and publish the response on `<topic>/response`
    /// through the session it arrived on
    pub async fn respond(
        &self,
        class: MeasurementClass,
        topic: &str,
        payload: &[u8],
        reply: &dyn Publisher,
    ) {
        let response = self.handle_request(class, payload).await;
        let topic = response_topic(topic);
        if let Err(e) = reply.publish(&topic, Bytes::from(response.to_vec())).await {
            error!("Unable to publish resend response to {}: {}", topic, e);
        }
    }
}

fn format_epoch(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| seconds.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_epoch(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_epoch(1_617_235_200), "2021-04-01T00:00:00Z");
    }
}
