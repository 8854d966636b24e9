use std::sync::Arc;

use application::{FeedService, GeoProximity, PresenceTracker};

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedService>,
    pub presence: Arc<PresenceTracker>,
    pub geo: Arc<GeoProximity>,
}

impl AppState {
    pub fn new(feed: Arc<FeedService>, presence: Arc<PresenceTracker>, geo: Arc<GeoProximity>) -> Self {
        Self { feed, presence, geo }
    }
}
