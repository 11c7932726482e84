use std::sync::Arc;

use crate::loader::CsvLoader;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub loader: CsvLoader,
}

impl AppState {
    pub fn new(pipeline: Pipeline, loader: CsvLoader) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            loader,
        }
    }
}
