//! Outgoing request description

/// A pre-built AniDB command and how to send it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command text, e.g. `FILE size=1&ed2k=...`
    pub command: String,
    /// Encode as UTF-16BE instead of ASCII
    pub needs_unicode: bool,
    /// Keepalive traffic; does not reset the non-ping idle clock
    pub is_ping: bool,
    /// Keep the command text out of the logs
    pub disable_logging: bool,
}

impl Request {
    /// ASCII request that is logged
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            needs_unicode: false,
            is_ping: false,
            disable_logging: false,
        }
    }

    /// Keepalive request
    pub fn ping(command: impl Into<String>) -> Self {
        Self {
            is_ping: true,
            ..Self::new(command)
        }
    }

    pub fn unicode(mut self, needs_unicode: bool) -> Self {
        self.needs_unicode = needs_unicode;
        self
    }

    pub fn without_logging(mut self) -> Self {
        self.disable_logging = true;
        self
    }

    /// Command name, the first word of the command text
    pub fn name(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or_default()
    }

    /// Copy of this request with `s=<session>` added to the parameters
    pub fn with_session(&self, session_id: &str) -> Self {
        let command = if has_param(&self.command, "s") {
            self.command.clone()
        } else if self.command.contains(' ') {
            format!("{}&s={session_id}", self.command)
        } else {
            format!("{} s={session_id}", self.command)
        };
        Self {
            command,
            ..self.clone()
        }
    }
}

fn has_param(command: &str, key: &str) -> bool {
    command
        .split_once(' ')
        .map(|(_, params)| {
            params
                .split('&')
                .any(|pair| pair.split_once('=').is_some_and(|(k, _)| k == key))
        })
        .unwrap_or(false)
}

/// Mask credential and session values for logging
pub fn mask_command(command: &str) -> String {
    let Some((name, params)) = command.split_once(' ') else {
        return command.to_string();
    };
    let masked = params
        .split('&')
        .map(|part| match part.split_once('=') {
            Some(("pass", _)) => "pass=***".to_string(),
            Some(("s", _)) => "s=***".to_string(),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{name} {masked}")
}
