use std::sync::Arc;

use crate::classifier::ClassifierClient;
use crate::store::{BanStore, RequestLogStore};

#[derive(Clone)]
pub struct AppState {
    pub bans: Arc<dyn BanStore>,
    pub logs: Arc<dyn RequestLogStore>,
    pub classifier: Arc<ClassifierClient>,
}
