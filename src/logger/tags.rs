/// Log tags - one per subsystem
///
/// A tag selects the console color and the `--debug-<key>` flag that unlocks
/// debug output for that subsystem.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Hub,
    Client,
    Webserver,
    Connector,
    Demo,
    Test,
    Other(String),
}

impl LogTag {
    /// Key used in `--debug-<key>` / `--verbose-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Hub => "hub".to_string(),
            LogTag::Client => "client".to_string(),
            LogTag::Webserver => "webserver".to_string(),
            LogTag::Connector => "connector".to_string(),
            LogTag::Demo => "demo".to_string(),
            LogTag::Test => "test".to_string(),
            LogTag::Other(name) => name.to_lowercase(),
        }
    }

    /// Uncolored label used in the line prefix
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::Other(name) => name.to_uppercase(),
            tag => tag.to_debug_key().to_uppercase(),
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
