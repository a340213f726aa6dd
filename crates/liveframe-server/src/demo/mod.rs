//! Demo components served by the `liveframe` binary.

mod light;
mod search;

pub use light::{Light, LightComponent};
pub use search::{search_by_zip, SearchComponent, SearchContext, SearchInfo, Store};

use liveframe_core::RouteTable;

/// Routes of every demo component.
#[must_use]
pub fn routes() -> RouteTable {
    RouteTable::new()
        .route("/search", SearchComponent)
        .route("/light", LightComponent)
}
