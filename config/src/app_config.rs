use directories::ProjectDirs;
use std::{
    env,
    path::PathBuf,
};

pub(crate) const PROJECT_NAME: &str = "AGENT_METRICS";

lazy_static::lazy_static! {
    static ref CONFIG_FOLDER: Option<PathBuf> = env::var(format!("{PROJECT_NAME}_CONFIG_DIR"))
        .ok()
        .map(PathBuf::from);
}

/// Directory searched for `config.yaml`. `AGENT_METRICS_CONFIG_DIR` overrides it.
pub fn get_config_dir() -> PathBuf {
    if let Some(dir) = CONFIG_FOLDER.clone() {
        dir
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "buildkite", "agent-metrics")
}
