use crate::utils::auth::{generate_salt, hash_password, verify_password};
use uuid::Uuid;

/// Level granted once the Terms of Service were accepted.
pub const LEVEL_AGREED_TOS: i32 = 1;
/// Level granted once the critical notice was read.
pub const LEVEL_READ_CRITICAL: i32 = 2;
pub const LEVEL_PREMIUM: i32 = 50;
pub const LEVEL_PREMIUM_PLUS: i32 = 100;
/// From this level on, group membership is unlimited.
pub const LEVEL_STAFF: i32 = 150;

pub const DEFAULT_TITLE: &str = "Resident";

/// A grid account record
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub password_salt: String,
    /// Privilege tier, see the `LEVEL_*` constants
    pub user_level: i32,
    pub user_title: String,
    pub agreed_to_tos: bool,
    pub read_critical: bool,
    /// Unix timestamp of the latest critical notice acknowledgment
    pub last_read_critical: Option<i64>,
    /// Unix timestamp of the previous successful login
    pub last_login: Option<i64>,
}

/// Group ceiling derived from an account's level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupAllowance {
    Unlimited,
    Limited(i32),
}

impl Account {
    /// Fresh account with a newly salted password hash
    pub fn new(first_name: &str, last_name: &str, password: &str) -> Self {
        let password_salt = generate_salt();
        let password_hash = hash_password(password, &password_salt);

        Self {
            user_id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password_hash,
            password_salt,
            user_level: 0,
            user_title: DEFAULT_TITLE.to_string(),
            agreed_to_tos: false,
            read_critical: false,
            last_read_critical: None,
            last_login: None,
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        verify_password(password, &self.password_salt, &self.password_hash)
    }

    pub fn set_password(&mut self, password: &str) {
        self.password_salt = generate_salt();
        self.password_hash = hash_password(password, &self.password_salt);
    }

    /// Case-folded lookup key for a name pair
    pub fn name_key(first_name: &str, last_name: &str) -> String {
        format!("{}.{}", first_name.to_lowercase(), last_name.to_lowercase())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn group_allowance(&self) -> GroupAllowance {
        if self.user_level >= LEVEL_STAFF {
            GroupAllowance::Unlimited
        } else if self.user_level >= LEVEL_PREMIUM_PLUS {
            GroupAllowance::Limited(240)
        } else if self.user_level >= LEVEL_PREMIUM {
            GroupAllowance::Limited(180)
        } else {
            GroupAllowance::Limited(14)
        }
    }

    /// Record a ToS acceptance. Returns true if the account changed.
    pub fn accept_tos(&mut self) -> bool {
        if self.agreed_to_tos {
            return false;
        }
        self.agreed_to_tos = true;
        if self.user_level == 0 {
            self.user_level = LEVEL_AGREED_TOS;
        }
        true
    }

    /// Whether the critical notice published at `notice_updated` still needs reading
    pub fn needs_critical(&self, notice_updated: i64) -> bool {
        !self.read_critical || self.last_read_critical.unwrap_or(0) < notice_updated
    }

    /// Record that the critical notice was read at `now`. Returns true if the account changed.
    pub fn acknowledge_critical(&mut self, now: i64, notice_updated: i64) -> bool {
        if !self.needs_critical(notice_updated) {
            return false;
        }
        self.read_critical = true;
        self.last_read_critical = Some(now);
        if self.user_level == LEVEL_AGREED_TOS {
            self.user_level = LEVEL_READ_CRITICAL;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_defaults() {
        let account = Account::new("Test", "User", "pw");

        assert_eq!(account.user_level, 0);
        assert_eq!(account.user_title, "Resident");
        assert!(!account.agreed_to_tos);
        assert!(account.last_login.is_none());
        assert!(account.verify_password("pw"));
        assert!(!account.verify_password("other"));
    }

    #[test]
    fn test_name_key_is_case_insensitive() {
        assert_eq!(Account::name_key("Test", "User"), Account::name_key("test", "USER"));
    }

    #[test]
    fn test_group_allowance_tiers() {
        let mut account = Account::new("A", "B", "pw");

        assert_eq!(account.group_allowance(), GroupAllowance::Limited(14));
        account.user_level = 50;
        assert_eq!(account.group_allowance(), GroupAllowance::Limited(180));
        account.user_level = 100;
        assert_eq!(account.group_allowance(), GroupAllowance::Limited(240));
        account.user_level = 150;
        assert_eq!(account.group_allowance(), GroupAllowance::Unlimited);
    }

    #[test]
    fn test_level_progression() {
        let mut account = Account::new("A", "B", "pw");

        // Reading the notice before the ToS does not skip a level
        assert!(account.acknowledge_critical(100, 0));
        assert_eq!(account.user_level, 0);

        let mut account = Account::new("A", "B", "pw");
        assert!(account.accept_tos());
        assert_eq!(account.user_level, LEVEL_AGREED_TOS);
        assert!(account.acknowledge_critical(100, 0));
        assert_eq!(account.user_level, LEVEL_READ_CRITICAL);
        assert_eq!(account.last_read_critical, Some(100));

        assert!(!account.accept_tos());
        assert!(!account.acknowledge_critical(200, 0));
        assert_eq!(account.last_read_critical, Some(100));
    }

    #[test]
    fn test_updated_notice_needs_rereading() {
        let mut account = Account::new("A", "B", "pw");
        account.accept_tos();
        account.acknowledge_critical(100, 0);

        assert!(!account.needs_critical(100));
        assert!(account.needs_critical(150));

        assert!(account.acknowledge_critical(200, 150));
        assert!(!account.needs_critical(150));
        assert_eq!(account.last_read_critical, Some(200));
        assert_eq!(account.user_level, LEVEL_READ_CRITICAL);
    }

    #[test]
    fn test_legacy_read_flag_satisfies_original_notice() {
        let mut account = Account::new("A", "B", "pw");
        account.read_critical = true;

        assert!(!account.needs_critical(0));
        assert!(account.needs_critical(1));
    }

    #[test]
    fn test_set_password_resalts() {
        let mut account = Account::new("A", "B", "old");
        let old_salt = account.password_salt.clone();

        account.set_password("new");

        assert_ne!(account.password_salt, old_salt);
        assert!(account.verify_password("new"));
        assert!(!account.verify_password("old"));
    }
}
