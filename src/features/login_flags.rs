use super::bus::{publish, FeatureProvider, NegotiationContext};
use crate::core::error::FeatureError;
use crate::models::login::FeatureSections;
use serde_json::json;

pub const OPTION: &str = "login-flags";

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Y"
    } else {
        "N"
    }
}

/// Stepwise login hints for the viewer
pub struct LoginFlagsProvider;

impl FeatureProvider for LoginFlagsProvider {
    fn name(&self) -> &'static str {
        "login-flags"
    }

    fn contribute(
        &self,
        ctx: &NegotiationContext<'_>,
        sections: &mut FeatureSections,
    ) -> Result<(), FeatureError> {
        if !ctx.wants(OPTION) {
            return Ok(());
        }

        let flags = json!([{
            "stipend_since_login": yes_no(false),
            "ever_logged_in": yes_no(!ctx.response.first_login),
            "seconds_since_epoch": ctx.now,
            "daylight_savings": yes_no(false),
            "gendered": yes_no(false),
        }]);

        publish(sections, self.name(), OPTION, flags);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::Account;
    use crate::models::login::LoginResponse;
    use crate::validation::login::sample_request;

    fn flags_for(account: &Account, options: &[&str]) -> FeatureSections {
        let request = sample_request("A", "B", options);
        let response = LoginResponse::seeded(account, &request);
        let ctx = NegotiationContext {
            options: &request.options,
            account,
            response: &response,
            now: 1_700_000_000,
        };

        let mut sections = FeatureSections::new();
        LoginFlagsProvider.contribute(&ctx, &mut sections).unwrap();
        sections
    }

    #[test]
    fn test_first_login_flags() {
        let account = Account::new("A", "B", "pw");

        let sections = flags_for(&account, &[OPTION]);
        let flags = &sections.get(OPTION).unwrap()[0];

        assert_eq!(flags["ever_logged_in"], "N");
        assert_eq!(flags["stipend_since_login"], "N");
        assert_eq!(flags["seconds_since_epoch"], 1_700_000_000);
    }

    #[test]
    fn test_returning_account_flags() {
        let mut account = Account::new("A", "B", "pw");
        account.last_login = Some(1_600_000_000);

        let sections = flags_for(&account, &[OPTION]);
        assert_eq!(sections.get(OPTION).unwrap()[0]["ever_logged_in"], "Y");
    }

    #[test]
    fn test_not_requested() {
        let account = Account::new("A", "B", "pw");
        assert!(flags_for(&account, &["inventory-root"]).is_empty());
    }
}
