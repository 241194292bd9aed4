pub mod checkin;
pub mod community;
pub mod config;
pub mod dispatch;
pub mod inbound;
pub mod patient;
pub mod protocol;
pub mod streak;

use vitalink_core::{Patient, Store};

/// Look up a patient by phone, failing with a readable message.
pub fn patient_by_phone(
    store: &Store,
    phone: &str,
) -> Result<Patient, Box<dyn std::error::Error>> {
    store
        .patient_by_phone(phone)?
        .ok_or_else(|| format!("no patient with phone {phone}").into())
}
