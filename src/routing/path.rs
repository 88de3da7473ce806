//! API path parsing.

/// First segment of every routed path.
pub const API_PREFIX: &str = "api";

/// Answered by the gateway, or relayed to the coordinator when there is one.
pub const HEARTBEAT_MODULE: &str = "heartbeat";

/// Build information, answered by the gateway itself.
pub const INFO_MODULE: &str = "info";

/// Reserved for the gateway's own bootstrap; never forwarded.
pub const ENTRYPOINT_MODULE: &str = "entrypoint";

/// A parsed `/api/{version}/{module}[/{param}[/{param_id}]]` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPath {
    pub version: String,
    pub module: String,
    pub param: Option<String>,
    pub param_id: Option<String>,
}

impl ApiPath {
    /// Parse a request path. A single trailing slash is tolerated.
    ///
    /// Returns `None` when the prefix is wrong, a segment is empty or there
    /// are too many segments.
    pub fn parse(path: &str) -> Option<Self> {
        let trimmed = path.strip_prefix('/')?;
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let mut segments = trimmed.split('/');

        if segments.next()? != API_PREFIX {
            return None;
        }
        let version = segment(segments.next()?)?;
        let module = segment(segments.next()?)?;
        let param = match segments.next() {
            Some(raw) => Some(segment(raw)?),
            None => None,
        };
        let param_id = match segments.next() {
            Some(raw) => Some(segment(raw)?),
            None => None,
        };
        if segments.next().is_some() {
            return None;
        }

        Some(Self {
            version,
            module,
            param,
            param_id,
        })
    }

    pub fn is_heartbeat(&self) -> bool {
        self.module == HEARTBEAT_MODULE
    }

    pub fn is_entrypoint(&self) -> bool {
        self.module == ENTRYPOINT_MODULE
    }

    pub fn is_info(&self) -> bool {
        self.module == INFO_MODULE
    }
}

fn segment(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
