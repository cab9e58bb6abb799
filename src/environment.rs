use std::fmt::{Display, Formatter};
use std::str::FromStr;
use clap::ValueEnum;

use crate::consts::endpoints;

/// Deployment the analysis backend runs in.
#[derive(Clone, Default, Copy, PartialEq, Eq, ValueEnum, Debug)]
pub enum EnvironmentType {
    /// Flask backend started directly on the developer machine.
    #[default]
    Local,
    /// Backend reached from inside the docker-compose network.
    Docker,
    /// Hosted deployment.
    #[value(alias = "prod")]
    Production,
}

/// Backend location plus the three endpoint URLs the submission flow talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    pub env_type: EnvironmentType,
    pub upload_url: String,
    pub signal_start_url: String,
    pub task_url: String,
}

impl Environment {
    /// Create the environment of the given type with its default endpoints.
    pub fn new(env_type: EnvironmentType) -> Self {
        let base = env_type.base_url();
        Self {
            env_type,
            upload_url: join(base, endpoints::UPLOAD),
            signal_start_url: join(base, endpoints::SIGNAL_START),
            task_url: join(base, endpoints::TASK),
        }
    }

    /// Replace any endpoint for which an override is given. Empty overrides are ignored.
    pub fn with_overrides(
        mut self,
        upload_url: Option<&str>,
        signal_start_url: Option<&str>,
        task_url: Option<&str>,
    ) -> Self {
        if let Some(url) = upload_url.filter(|u| !u.is_empty()) {
            self.upload_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = signal_start_url.filter(|u| !u.is_empty()) {
            self.signal_start_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = task_url.filter(|u| !u.is_empty()) {
            self.task_url = url.trim_end_matches('/').to_string();
        }
        self
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(EnvironmentType::default())
    }
}

impl EnvironmentType {
    pub fn base_url(&self) -> &'static str {
        match self {
            EnvironmentType::Local => "http://localhost:5005",
            EnvironmentType::Docker => "http://host.docker.internal:5005",
            EnvironmentType::Production => "https://analysis.apk-submit.dev",
        }
    }
}

fn join(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<EnvironmentType>().map(Environment::new)
    }
}

impl FromStr for EnvironmentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(EnvironmentType::Local),
            "docker" => Ok(EnvironmentType::Docker),
            "production" | "prod" => Ok(EnvironmentType::Production),
            _ => Err(()),
        }
    }
}

impl Display for EnvironmentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentType::Local => write!(f, "Local"),
            EnvironmentType::Docker => write!(f, "Docker"),
            EnvironmentType::Production => write!(f, "Production"),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.env_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_endpoints() {
        let env = Environment::new(EnvironmentType::Local);
        assert_eq!(env.upload_url, "http://localhost:5005/upload");
        assert_eq!(env.signal_start_url, "http://localhost:5005/signal_start");
        assert_eq!(env.task_url, "http://localhost:5005/task");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("DOCKER".parse::<EnvironmentType>(), Ok(EnvironmentType::Docker));
        assert_eq!("prod".parse::<EnvironmentType>(), Ok(EnvironmentType::Production));
        assert!("mars".parse::<Environment>().is_err());
    }

    #[test]
    // Empty overrides keep the defaults, trailing slashes are dropped.
    fn test_overrides() {
        let env = Environment::default().with_overrides(
            Some("http://example.test/up/"),
            Some(""),
            None,
        );
        assert_eq!(env.upload_url, "http://example.test/up");
        assert_eq!(env.signal_start_url, "http://localhost:5005/signal_start");
        assert_eq!(env.task_url, "http://localhost:5005/task");
    }
}
