use crate::core::error::LoginError;
use crate::core::state::AppState;
use crate::models::login::{LoginRequest, LoginResponse, SessionGrant};
use crate::models::presence::Presence;
use crate::rpc::response::build_login_reply;
use crate::stores::account_store::AccountStore;
use crate::stores::inventory_store::is_reserved_name;
use crate::utils::time::current_timestamp;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const WELCOME_MESSAGE: &str = "Welcome";
pub const BAD_CREDENTIALS_MESSAGE: &str =
    "Could not authenticate your avatar. Please check your username and password, and try again.";

fn session_grant(state: &AppState, presence: &Presence, now: i64) -> SessionGrant {
    let grid = &state.config.grid;
    let base = grid.base_url.trim_end_matches('/');

    SessionGrant {
        circuit_code: presence.circuit_code,
        session_id: presence.session_id,
        secure_session_id: presence.secure_session_id,
        region_x: 0,
        region_y: 0,
        region_size: grid.region_size,
        sim_ip: grid.sim_ip.clone(),
        sim_port: grid.sim_port,
        inventory_host: state.config.inventory_host().to_string(),
        seed_capability: format!("{}/simulation/CAP/{}", base, presence.session_id),
        map_server_url: format!("{}/simulation/map", base),
        seconds_since_epoch: now,
    }
}

/// Run one login negotiation.
///
/// # Flow
/// 1. Refuse reserved names, then resolve the account, creating it on first use
/// 2. Check the password (a mismatch returns `login=false` and changes nothing)
/// 3. Record ToS / critical notice acknowledgments carried by the request
/// 4. If configured, require both acknowledgments to be current
/// 5. Register a presence and grant the session
/// 6. Run the feature bus; a storage failure unregisters the presence
/// 7. Stamp `last_login`
pub fn handle(state: &AppState, request: &LoginRequest, now: i64) -> Result<LoginResponse, LoginError> {
    if is_reserved_name(&request.first, &request.last) {
        return Err(LoginError::AccountResolution(format!(
            "{} {} is reserved",
            request.first, request.last
        )));
    }

    let (mut account, created) =
        state
            .accounts
            .resolve_or_create(&request.first, &request.last, &request.passwd)?;

    debug!(account_id = %account.user_id, created, "Account resolved");

    let policy = &state.config.login;

    if policy.verify_passwords && !account.verify_password(&request.passwd) {
        warn!(account_id = %account.user_id, "Password mismatch");
        let mut response = LoginResponse::seeded(&account, request);
        response.deny("key", BAD_CREDENTIALS_MESSAGE);
        return Ok(response);
    }

    let mut changed = false;
    if request.agree_to_tos {
        changed |= account.accept_tos();
    }
    if request.read_critical {
        changed |= account.acknowledge_critical(now, policy.critical_notice_updated);
    }
    if changed {
        state.accounts.save(&account)?;
    }

    let mut response = LoginResponse::seeded(&account, request);

    if policy.require_tos {
        if !account.agreed_to_tos {
            debug!(account_id = %account.user_id, "Terms of Service not accepted");
            response.deny("tos", policy.tos_message.clone());
            return Ok(response);
        }
        if account.needs_critical(policy.critical_notice_updated) {
            debug!(account_id = %account.user_id, "Critical notice not read");
            response.deny("critical", policy.critical_message.clone());
            return Ok(response);
        }
    }

    let presence = state.presence.register_at(&account, now);
    response.session = Some(session_grant(state, &presence, now));
    response.login = true;
    response.message = WELCOME_MESSAGE.to_string();

    let report = match state.bus.negotiate(&account, &mut response, now) {
        Ok(report) => report,
        Err(e) => {
            state.presence.remove_circuit(presence.circuit_code);
            return Err(LoginError::Storage(e));
        }
    };

    if !report.failed.is_empty() {
        state.metrics.add_provider_failures(report.failed.len());
    }

    account.last_login = Some(now);
    if let Err(e) = state.accounts.save(&account) {
        state.presence.remove_circuit(presence.circuit_code);
        return Err(LoginError::Storage(e));
    }

    info!(
        account_id = %account.user_id,
        circuit_code = presence.circuit_code,
        sections = response.sections.len(),
        "Login granted"
    );

    Ok(response)
}

/// XML-RPC login endpoint
///
/// POST /login, POST /simulator/login
///
/// Decoding and negotiation touch the journal and inventory files, so the
/// whole call runs on the blocking pool.
#[instrument(skip(state, body))]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Response, LoginError> {
    state.metrics.increment_logins();

    let worker = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || {
        let request = LoginRequest::decode(&body)?;
        debug!(
            first = %request.first,
            last = %request.last,
            options = request.options.len(),
            "Login request decoded"
        );
        handle(&worker, &request, current_timestamp())
    })
    .await
    .unwrap_or_else(|e| Err(LoginError::Negotiation(format!("login task aborted: {}", e))));

    let response = match outcome {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Login failed");
            state.metrics.increment_failed();
            return Err(e);
        }
    };

    if response.is_granted() {
        state.metrics.increment_successful();
    } else {
        state.metrics.increment_denied();
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        build_login_reply(&response),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{FeatureError, StoreError};
    use crate::core::state::test_state;
    use crate::features::bus::{FeatureBus, FeatureProvider, NegotiationContext};
    use crate::models::login::FeatureSections;
    use crate::rpc::parser::{parse_method_response, RpcResponse};
    use crate::rpc::value::RpcValue;
    use crate::stores::inventory_store::{LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME, LIBRARIAN_LEVEL};
    use crate::validation::login::sample_request;
    use http_body_util::BodyExt;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    struct BrokenDisk;

    impl FeatureProvider for BrokenDisk {
        fn name(&self) -> &'static str {
            "broken-disk"
        }

        fn contribute(
            &self,
            _ctx: &NegotiationContext<'_>,
            _sections: &mut FeatureSections,
        ) -> Result<(), FeatureError> {
            Err(FeatureError::Storage(StoreError::Serialize("disk full".to_string())))
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_first_login_creates_account_and_presence() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(temp_dir.path());
        let request = sample_request("Jane", "Doe", &["login-flags", "inventory-root"]);

        let response = handle(&state, &request, NOW).unwrap();

        assert!(response.is_granted());
        assert_eq!(response.message, WELCOME_MESSAGE);
        assert!(response.first_login);
        assert!(response.sections.contains("login-flags"));
        assert!(response.sections.contains("inventory-root"));
        assert!(response.sections.contains("grid-info"));

        let account = state.accounts.get("jane", "doe").unwrap();
        assert_eq!(account.user_id, response.agent_id);
        assert_eq!(account.last_login, Some(NOW));
        assert!(account.agreed_to_tos);
        assert!(account.read_critical);

        let session = response.session.unwrap();
        let presence = state.presence.lookup(account.user_id).unwrap();
        assert_eq!(presence.circuit_code, session.circuit_code);
        assert_eq!(presence.session_id, session.session_id);
        assert_eq!(session.inventory_host, "localhost:7768");
        assert_eq!(
            session.seed_capability,
            format!("http://localhost:7768/simulation/CAP/{}", session.session_id)
        );
    }

    #[test]
    fn test_second_login_is_not_first() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(temp_dir.path());
        let request = sample_request("Jane", "Doe", &[]);

        let first = handle(&state, &request, NOW).unwrap();
        let second = handle(&state, &request, NOW + 60).unwrap();

        assert!(first.first_login);
        assert!(!second.first_login);
        assert_eq!(first.agent_id, second.agent_id);
        assert_eq!(state.presence.len(), 1);
        assert!(
            second.session.unwrap().circuit_code > first.session.unwrap().circuit_code
        );
    }

    #[test]
    fn test_wrong_password_denied() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(temp_dir.path());
        state.accounts.create("Jane", "Doe", "other").unwrap();

        let response = handle(&state, &sample_request("Jane", "Doe", &["login-flags"]), NOW).unwrap();

        assert!(!response.is_granted());
        assert_eq!(response.reason.as_deref(), Some("key"));
        assert!(response.sections.is_empty());
        assert!(state.presence.is_empty());
    }

    #[test]
    fn test_wrong_password_records_no_acknowledgments() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(temp_dir.path());
        let before = state.accounts.create("Jane", "Doe", "real").unwrap();

        let response = handle(&state, &sample_request("Jane", "Doe", &[]), NOW).unwrap();

        assert_eq!(response.reason.as_deref(), Some("key"));
        assert!(!response.agreed_to_tos);
        assert_eq!(state.accounts.get("Jane", "Doe"), Some(before));
    }

    #[test]
    fn test_library_owner_name_cannot_log_in() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(temp_dir.path());
        let request = sample_request("librarian", "REAPER", &[]);

        let result = handle(&state, &request, NOW);

        assert!(matches!(result, Err(LoginError::AccountResolution(_))));
        assert!(state.accounts.get(LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME).is_none());
        assert!(state.presence.is_empty());

        // The library can still be bootstrapped afterwards
        let (owner, _) = state.inventory.library(state.accounts.as_ref()).unwrap();
        assert_eq!(owner.user_level, LIBRARIAN_LEVEL);
    }

    #[test]
    fn test_library_owner_untouched_by_login_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(temp_dir.path());
        handle(&state, &sample_request("Jane", "Doe", &["inventory-lib-owner"]), NOW).unwrap();
        let owner = state
            .accounts
            .get(LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME)
            .unwrap();

        let request = sample_request(LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME, &[]);
        let result = handle(&state, &request, NOW + 10);

        assert!(matches!(result, Err(LoginError::AccountResolution(_))));
        assert_eq!(
            state.accounts.get(LIBRARIAN_FIRST_NAME, LIBRARIAN_LAST_NAME),
            Some(owner)
        );
        assert_eq!(state.presence.len(), 1);
    }

    #[test]
    fn test_updated_critical_notice_is_asked_again() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = test_state(temp_dir.path());
        let mut config = (*state.config).clone();
        config.login.require_tos = true;
        state.config = Arc::new(config.clone());

        let response = handle(&state, &sample_request("Jane", "Doe", &[]), NOW).unwrap();
        assert!(response.is_granted());

        config.login.critical_notice_updated = NOW + 100;
        state.config = Arc::new(config);

        let mut request = sample_request("Jane", "Doe", &[]);
        request.read_critical = false;
        let response = handle(&state, &request, NOW + 200).unwrap();
        assert_eq!(response.reason.as_deref(), Some("critical"));

        request.read_critical = true;
        let response = handle(&state, &request, NOW + 300).unwrap();
        assert!(response.is_granted());
        let account = state.accounts.get("Jane", "Doe").unwrap();
        assert_eq!(account.last_read_critical, Some(NOW + 300));
    }

    #[test]
    fn test_password_check_can_be_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = test_state(temp_dir.path());
        let mut config = (*state.config).clone();
        config.login.verify_passwords = false;
        state.config = Arc::new(config);
        state.accounts.create("Jane", "Doe", "other").unwrap();

        let response = handle(&state, &sample_request("Jane", "Doe", &[]), NOW).unwrap();
        assert!(response.is_granted());
    }

    #[test]
    fn test_tos_gating() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = test_state(temp_dir.path());
        let mut config = (*state.config).clone();
        config.login.require_tos = true;
        state.config = Arc::new(config);

        let mut request = sample_request("Jane", "Doe", &[]);
        request.agree_to_tos = false;
        request.read_critical = false;

        let response = handle(&state, &request, NOW).unwrap();
        assert_eq!(response.reason.as_deref(), Some("tos"));
        assert_eq!(response.message, state.config.login.tos_message);

        request.agree_to_tos = true;
        let response = handle(&state, &request, NOW).unwrap();
        assert_eq!(response.reason.as_deref(), Some("critical"));
        assert!(state.presence.is_empty());

        request.read_critical = true;
        let response = handle(&state, &request, NOW).unwrap();
        assert!(response.is_granted());
        assert_eq!(state.accounts.get("Jane", "Doe").unwrap().user_level, 2);
    }

    #[test]
    fn test_storage_failure_unregisters_presence() {
        let temp_dir = TempDir::new().unwrap();
        let mut state = test_state(temp_dir.path());
        state.bus = Arc::new(FeatureBus::new().register(Arc::new(BrokenDisk)));

        let result = handle(&state, &sample_request("Jane", "Doe", &[]), NOW);

        assert!(matches!(result, Err(LoginError::Storage(_))));
        assert!(state.presence.is_empty());
        assert_eq!(state.accounts.get("Jane", "Doe").unwrap().last_login, None);
    }

    #[test]
    fn test_concurrent_first_logins_share_one_account() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(temp_dir.path());

        let agents: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let state = &state;
                    scope.spawn(move || {
                        let request = sample_request("Jane", "Doe", &["inventory-lib-root"]);
                        handle(state, &request, NOW).unwrap().agent_id
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(agents.windows(2).all(|w| w[0] == w[1]));
        // Jane plus the library owner
        assert_eq!(state.accounts.len(), 2);
        assert_eq!(state.presence.len(), 1);
    }

    #[tokio::test]
    async fn test_login_handler_replies_xml() {
        let temp_dir = TempDir::new().unwrap();
        let state = Arc::new(test_state(temp_dir.path()));
        let body = sample_request("Jane", "Doe", &["max-agent-groups"]).to_call();

        let response = login_handler(State(Arc::clone(&state)), body).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );

        let reply = match parse_method_response(&body_text(response).await).unwrap() {
            RpcResponse::Success(value) => value,
            other => panic!("Expected success, got {:?}", other),
        };
        assert_eq!(reply.member("login"), Some(&RpcValue::Bool(true)));
        assert_eq!(reply.member("first_name").and_then(RpcValue::as_str), Some("Jane"));
        assert_eq!(reply.member("max-agent-groups"), Some(&RpcValue::Int(14)));
        assert!(reply.member("grid-info").is_some());

        assert_eq!(state.metrics.total_logins.load(Ordering::Relaxed), 1);
        assert_eq!(state.metrics.successful_logins.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_login_handler_denial_reply() {
        let temp_dir = TempDir::new().unwrap();
        let state = Arc::new(test_state(temp_dir.path()));
        state.accounts.create("Jane", "Doe", "other").unwrap();
        let body = sample_request("Jane", "Doe", &[]).to_call();

        let response = login_handler(State(Arc::clone(&state)), body).await.unwrap();

        let reply = match parse_method_response(&body_text(response).await).unwrap() {
            RpcResponse::Success(value) => value,
            other => panic!("Expected success, got {:?}", other),
        };
        assert_eq!(reply.member("login"), Some(&RpcValue::Bool(false)));
        assert_eq!(reply.member("reason").and_then(RpcValue::as_str), Some("key"));
        assert!(reply.member("session_id").is_none());
        assert_eq!(state.metrics.denied_logins.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_login_handler_malformed_is_fault() {
        let temp_dir = TempDir::new().unwrap();
        let state = Arc::new(test_state(temp_dir.path()));

        let result = login_handler(State(Arc::clone(&state)), "<methodCall>".to_string()).await;

        let err = result.unwrap_err();
        assert!(matches!(err, LoginError::MalformedRequest(_)));
        assert!(state.presence.is_empty());
        assert_eq!(state.metrics.failed_logins.load(Ordering::Relaxed), 1);
    }
}
