pub mod cohort;
pub mod types;

pub use cohort::{
    default_cohorts, reverse_code, CohortSpec, MetaField, ResponseScale, TargetField, COMMON_MAX,
    COMMON_MIN,
};
pub use types::{CanonicalItem, ItemResponses, Subscale, ITEMS_PER_SUBSCALE, ITEM_COUNT};
