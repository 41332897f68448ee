//! HTML extraction for the listing page and both video hosts.

pub mod alternate;
pub(crate) mod html;
pub mod listing;
pub mod primary;
pub mod series_name;
