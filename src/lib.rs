pub mod constants;
pub mod daily;
pub mod error;
pub mod pipeline;
pub mod storage;
#[cfg(test)]
pub mod test;
pub mod tfjs;
pub mod util {
    pub mod config;
    pub mod feature_engineering;
    pub mod file_utils;
    pub mod model_utils;
    pub mod pre_processor;
    pub mod scaler;
    #[cfg(test)]
    pub mod test_utils;
}

/// Compile-time build information
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
