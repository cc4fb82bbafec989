//! Resource enumeration
//!
//! - [`record`] - the immutable `ResourceRecord` snapshot
//! - [`enumerator`] - paginated listing of a subscription's resources

pub mod enumerator;
pub mod record;

pub use enumerator::{list_resources, ResourceFilter, ResourcePager, SubscriptionListing};
pub use record::ResourceRecord;
