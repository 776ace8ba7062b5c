use std::path::PathBuf;

pub struct AppPaths {
    pub data_path: PathBuf,
    pub workspace_path: PathBuf,
    pub weights_path: PathBuf,
    pub model_path: PathBuf,
    pub training_config: Option<PathBuf>,
}

impl AppPaths {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.into()))
        };
        Self {
            data_path: path("DATA_PATH", "flowers"),
            workspace_path: path("WORKSPACE_PATH", "workspace"),
            weights_path: path("WEIGHTS_PATH", "resnet50-weights.pth"),
            model_path: path("MODEL_PATH", "Model"),
            training_config: lookup("TRAINING_CONFIG").map(PathBuf::from),
        }
    }
}
