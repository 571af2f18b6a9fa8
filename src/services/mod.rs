pub(crate) mod analyzer;
pub(crate) mod assistant;
pub(crate) mod extract;
pub(crate) mod fallback;
pub(crate) mod generation;
pub(crate) mod grading;
pub(crate) mod model_client;
pub(crate) mod web_search;
