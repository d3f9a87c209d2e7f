//! Requester-facing message texts

use inncheck_common::Inn;

pub const GREETING: &str = "Hello!\n\n\
I look up an INN in the EFRSB bankruptcy registry and in the Kad.Arbitr \
arbitration case index. Send an INN (10 or 12 digits) to start a search.";

pub const INVALID_INN: &str = "Error: INN must contain 10 or 12 digits.";

pub const SHUTTING_DOWN: &str =
    "The service is restarting and your request was not processed. Please send the INN again in a few minutes.";

pub fn accepted(inn: &Inn, position: usize) -> String {
    format!(
        "Request accepted for INN {}. Position in queue: {}. Processing has started, please wait.",
        inn, position
    )
}

pub fn queue_full(capacity: usize) -> String {
    format!(
        "The request queue is full ({} requests). Please try again later.",
        capacity
    )
}

pub fn internal_fault(inn: &Inn) -> String {
    format!(
        "An internal error occurred while processing INN {}. Please try again.",
        inn
    )
}
