//! Per-resource operations, one extension trait per backend resource.
//!
//! Every trait has a blanket implementation for all `Backend` types, so
//! importing a trait is enough to call its operations on a `CrmClient`.

pub mod attachment;
pub mod campaign;
pub mod contact;
pub mod target_list;
pub mod webform;
pub mod website;

pub use attachment::AttachmentApi;
pub use campaign::CampaignApi;
pub use contact::ContactApi;
pub use target_list::TargetListApi;
pub use webform::{SubmissionOutcome, WebformApi};
pub use website::{NewWebsiteUser, WebsiteApi};
