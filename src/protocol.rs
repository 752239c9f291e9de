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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The two independent measurement record sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementClass {
    Raw,
    Pollutant,
}

impl MeasurementClass {
    pub const ALL: [MeasurementClass; 2] = [MeasurementClass::Raw, MeasurementClass::Pollutant];

    /// Table holding records of this class inside a store file
    pub fn table(self) -> &'static str {
        match self {
            MeasurementClass::Raw => "raw",
            MeasurementClass::Pollutant => "pollutant",
        }
    }

    /// Decode the capture timestamp from a MessagePack measurement payload
    pub fn decode_timestamp(self, payload: &[u8]) -> Result<i64, PayloadError> {
        let timestamp = match self {
            MeasurementClass::Raw => rmp_serde::from_slice::<RawDataMsgPack>(payload)?.timestamp,
            MeasurementClass::Pollutant => {
                rmp_serde::from_slice::<PollutantDataMsgPack>(payload)?.timestamp
            }
        };
        Ok(timestamp)
    }
}

impl fmt::Display for MeasurementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Error)]
#[error("undecodable measurement payload: {0}")]
pub struct PayloadError(#[from] rmp_serde::decode::Error);

/// Raw sensor channel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataMsgPack {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "RawData", default)]
    pub raw_data: HashMap<String, f64>,
}

/// Location plus derived pollutant concentrations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollutantDataMsgPack {
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "GPS", default)]
    pub gps: HashMap<String, f64>,
    #[serde(rename = "PollutantData", default)]
    pub pollutant_data: HashMap<String, f64>,
}

/// Resend request, JSON encoded
///
/// Both bounds are inclusive seconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendRequest {
    #[serde(rename = "StartDate")]
    pub start_date: i64,
    #[serde(rename = "EndDate")]
    pub end_date: i64,
    /// Echoed back in the response so concurrent requests can be told apart
    #[serde(rename = "RequestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Unable to parse resend request: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid resend range: StartDate {start} and EndDate {end} must satisfy 0 <= StartDate <= EndDate")]
    InvalidRange { start: i64, end: i64 },
}

impl ResendRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, RequestError> {
        let request: ResendRequest = serde_json::from_slice(payload)?;
        if request.start_date < 0 || request.start_date > request.end_date {
            return Err(RequestError::InvalidRange {
                start: request.start_date,
                end: request.end_date,
            });
        }
        Ok(request)
    }
}

/// Response published on `<request topic>/response`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ResendResponse {
    pub fn success(message: String, request_id: Option<String>) -> Self {
        Self {
            success: true,
            message,
            request_id,
        }
    }

    pub fn error(message: String, request_id: Option<String>) -> Self {
        Self {
            success: false,
            message,
            request_id,
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        // A struct of a bool and strings always serializes
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Topic a resend response is published on
pub fn response_topic(request_topic: &str) -> String {
    format!("{}/response", request_topic)
}
