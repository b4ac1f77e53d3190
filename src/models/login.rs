use crate::models::account::{Account, GroupAllowance};
use serde_json::Value;
use uuid::Uuid;

/// Decoded `login_to_simulator` call
#[derive(Clone, Debug, PartialEq)]
pub struct LoginRequest {
    pub first: String,
    pub last: String,
    pub passwd: String,
    pub start: String,
    pub channel: String,
    pub version: String,
    pub platform: String,
    pub platform_string: String,
    pub platform_version: String,
    pub mac: String,
    pub id0: String,
    pub host_id: String,
    pub token: String,
    pub mfa_hash: String,
    pub agree_to_tos: bool,
    pub read_critical: bool,
    pub address_size: i32,
    pub extended_errors: i32,
    pub last_exec_duration: i32,
    pub last_exec_event: i32,
    /// Requested optional sections; duplicates allowed, order irrelevant
    pub options: Vec<String>,
}

impl LoginRequest {
    pub fn wants(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    pub fn start_location(&self) -> StartLocation {
        StartLocation::parse(&self.start)
    }
}

/// Requested starting point
#[derive(Clone, Debug, PartialEq)]
pub enum StartLocation {
    Last,
    Home,
    Region {
        name: String,
        x: f32,
        y: f32,
        z: f32,
    },
}

impl StartLocation {
    /// Parses `last`, `home` or `uri:Region&x&y&z`; anything else means `last`
    pub fn parse(raw: &str) -> Self {
        match raw {
            "home" => return StartLocation::Home,
            "last" | "" => return StartLocation::Last,
            _ => {}
        }

        let Some(rest) = raw.strip_prefix("uri:") else {
            return StartLocation::Last;
        };

        let mut parts = rest.split('&');
        let name = match parts.next() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => return StartLocation::Last,
        };
        let mut coord = |default: f32| {
            parts
                .next()
                .and_then(|p| p.parse::<f32>().ok())
                .unwrap_or(default)
        };
        let x = coord(128.0);
        let y = coord(128.0);
        let z = coord(50.0);

        StartLocation::Region { name, x, y, z }
    }

    /// Wire form for the `start_location` reply field
    pub fn describe(&self) -> String {
        match self {
            StartLocation::Last => "last".to_string(),
            StartLocation::Home => "home".to_string(),
            StartLocation::Region { name, x, y, z } => format!("{}/{}/{}/{}", name, x, y, z),
        }
    }
}

/// Option-keyed sections contributed by feature providers.
///
/// Insert-only: a provider can add sections but never remove or
/// overwrite one written before it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureSections {
    entries: Vec<(String, Value)>,
}

impl FeatureSections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a section. Returns false if the name was already taken.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, value));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Session details granted by a successful login
#[derive(Clone, Debug, PartialEq)]
pub struct SessionGrant {
    pub circuit_code: u32,
    pub session_id: Uuid,
    pub secure_session_id: Uuid,
    pub region_x: u32,
    pub region_y: u32,
    pub region_size: u32,
    pub sim_ip: String,
    pub sim_port: u16,
    pub inventory_host: String,
    pub seed_capability: String,
    pub map_server_url: String,
    pub seconds_since_epoch: i64,
}

/// Login reply accumulator
#[derive(Clone, Debug, PartialEq)]
pub struct LoginResponse {
    pub login: bool,
    /// Machine-readable denial code (`key`, `tos`, `critical`, ...)
    pub reason: Option<String>,
    pub message: String,
    pub agent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub agreed_to_tos: bool,
    pub read_critical: bool,
    pub requested_options: Vec<String>,
    pub unlimited_groups: bool,
    pub max_groups: i32,
    /// True when the account had never logged in before this call
    pub first_login: bool,
    pub start_location: String,
    pub session: Option<SessionGrant>,
    pub sections: FeatureSections,
}

impl LoginResponse {
    /// Reply seeded from the resolved account and the request, not yet granted
    pub fn seeded(account: &Account, request: &LoginRequest) -> Self {
        let (unlimited_groups, max_groups) = match account.group_allowance() {
            GroupAllowance::Unlimited => (true, 0),
            GroupAllowance::Limited(max) => (false, max),
        };

        Self {
            login: false,
            reason: None,
            message: String::new(),
            agent_id: account.user_id,
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            agreed_to_tos: account.agreed_to_tos,
            read_critical: account.read_critical,
            requested_options: request.options.clone(),
            unlimited_groups,
            max_groups,
            first_login: account.last_login.is_none(),
            start_location: request.start_location().describe(),
            session: None,
            sections: FeatureSections::new(),
        }
    }

    pub fn deny(&mut self, reason: &str, message: impl Into<String>) {
        self.login = false;
        self.reason = Some(reason.to_string());
        self.message = message.into();
        self.session = None;
    }

    pub fn is_granted(&self) -> bool {
        self.login && self.session.is_some()
    }
}
