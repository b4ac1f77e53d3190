use super::encoder::{close_struct, encode_member, encode_method_response, open_struct};
use super::value::RpcValue;
use crate::models::login::LoginResponse;
use tracing::warn;

/// Reply members written by the login codec itself. Provider sections
/// with one of these names are dropped.
pub const FIXED_FIELDS: &[&str] = &[
    "login",
    "reason",
    "message",
    "first_name",
    "last_name",
    "agent_id",
    "session_id",
    "secure_session_id",
    "circuit_code",
    "region_x",
    "region_y",
    "region_size_x",
    "region_size_y",
    "look_at",
    "agent_access",
    "agent_access_max",
    "start_location",
    "seconds_since_epoch",
    "inventory_host",
    "seed_capability",
    "map-server-url",
    "sim_ip",
    "sim_port",
];

// XML-RPC only has a 32-bit int; larger values saturate
fn wire_int<T: TryInto<i32>>(value: T) -> i32 {
    value.try_into().unwrap_or(i32::MAX)
}

/// Build the XML-RPC `methodResponse` for a login outcome
pub fn build_login_reply(response: &LoginResponse) -> String {
    let mut buf = String::with_capacity(2048);
    open_struct(&mut buf);

    encode_member("login", &response.login, &mut buf);

    match &response.session {
        Some(session) if response.login => {
            encode_member("message", response.message.as_str(), &mut buf);
            encode_member("first_name", response.first_name.as_str(), &mut buf);
            encode_member("last_name", response.last_name.as_str(), &mut buf);
            encode_member("agent_id", response.agent_id.to_string().as_str(), &mut buf);
            encode_member("session_id", session.session_id.to_string().as_str(), &mut buf);
            encode_member(
                "secure_session_id",
                session.secure_session_id.to_string().as_str(),
                &mut buf,
            );
            // Circuit codes travel as a signed i4
            encode_member("circuit_code", &(session.circuit_code as i32), &mut buf);
            encode_member("region_x", &wire_int(session.region_x), &mut buf);
            encode_member("region_y", &wire_int(session.region_y), &mut buf);
            encode_member("region_size_x", &wire_int(session.region_size), &mut buf);
            encode_member("region_size_y", &wire_int(session.region_size), &mut buf);
            encode_member("look_at", "[r0,r0,r0]", &mut buf);
            encode_member("agent_access", "M", &mut buf);
            encode_member("agent_access_max", "A", &mut buf);
            encode_member("start_location", response.start_location.as_str(), &mut buf);
            encode_member(
                "seconds_since_epoch",
                &wire_int(session.seconds_since_epoch),
                &mut buf,
            );
            encode_member("inventory_host", session.inventory_host.as_str(), &mut buf);
            encode_member("seed_capability", session.seed_capability.as_str(), &mut buf);
            encode_member("map-server-url", session.map_server_url.as_str(), &mut buf);
            encode_member("sim_ip", session.sim_ip.as_str(), &mut buf);
            encode_member("sim_port", &i32::from(session.sim_port), &mut buf);

            for (name, value) in response.sections.iter() {
                if FIXED_FIELDS.contains(&name) {
                    warn!(section = name, "Section collides with a fixed reply field, dropped");
                    continue;
                }
                encode_member(name, &RpcValue::from(value), &mut buf);
            }
        }
        _ => {
            let reason = response.reason.as_deref().unwrap_or("false");
            encode_member("reason", reason, &mut buf);
            encode_member("message", response.message.as_str(), &mut buf);
        }
    }

    close_struct(&mut buf);
    encode_method_response(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::login::{FeatureSections, SessionGrant};
    use crate::rpc::parser::{parse_method_response, RpcResponse};
    use serde_json::json;
    use uuid::Uuid;

    fn granted() -> LoginResponse {
        LoginResponse {
            login: true,
            reason: None,
            message: "Welcome".to_string(),
            agent_id: Uuid::new_v4(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            agreed_to_tos: true,
            read_critical: true,
            requested_options: vec!["login-flags".to_string()],
            unlimited_groups: false,
            max_groups: 14,
            first_login: true,
            start_location: "last".to_string(),
            session: Some(SessionGrant {
                circuit_code: 7,
                session_id: Uuid::new_v4(),
                secure_session_id: Uuid::new_v4(),
                region_x: 0,
                region_y: 0,
                region_size: 256,
                sim_ip: "127.0.0.1".to_string(),
                sim_port: 9000,
                inventory_host: "localhost:7768".to_string(),
                seed_capability: "http://localhost:7768/simulation/CAP/x".to_string(),
                map_server_url: "http://localhost:7768/simulation/map".to_string(),
                seconds_since_epoch: 1_700_000_000,
            }),
            sections: FeatureSections::new(),
        }
    }

    fn decode(xml: &str) -> RpcValue {
        match parse_method_response(xml).unwrap() {
            RpcResponse::Success(value) => value,
            other => panic!("Expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_granted_reply_fixed_fields() {
        let response = granted();
        let reply = decode(&build_login_reply(&response));

        assert_eq!(reply.member("login"), Some(&RpcValue::Bool(true)));
        assert_eq!(reply.member("circuit_code"), Some(&RpcValue::Int(7)));
        assert_eq!(
            reply.member("agent_id"),
            Some(&RpcValue::from(response.agent_id.to_string()))
        );
        assert_eq!(reply.member("region_size_x"), Some(&RpcValue::Int(256)));
        assert_eq!(reply.member("sim_port"), Some(&RpcValue::Int(9000)));
        assert_eq!(reply.member("look_at"), Some(&RpcValue::from("[r0,r0,r0]")));
        assert!(reply.member("reason").is_none());

        let names: Vec<&str> = reply
            .as_struct()
            .unwrap()
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        for field in FIXED_FIELDS.iter().filter(|f| **f != "reason") {
            assert!(names.contains(field), "missing {}", field);
        }
    }

    #[test]
    fn test_sections_follow_fixed_fields() {
        let mut response = granted();
        response
            .sections
            .insert("login-flags", json!([{"ever_logged_in": "N"}]));
        response.sections.insert("max-agent-groups", json!(14));

        let reply = decode(&build_login_reply(&response));
        let members = reply.as_struct().unwrap();

        assert_eq!(members[members.len() - 2].0, "login-flags");
        assert_eq!(members[members.len() - 1].0, "max-agent-groups");
        assert_eq!(reply.member("max-agent-groups"), Some(&RpcValue::Int(14)));
    }

    #[test]
    fn test_colliding_section_is_dropped() {
        let mut response = granted();
        response.sections.insert("circuit_code", json!(999));

        let reply = decode(&build_login_reply(&response));
        let count = reply
            .as_struct()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == "circuit_code")
            .count();

        assert_eq!(count, 1);
        assert_eq!(reply.member("circuit_code"), Some(&RpcValue::Int(7)));
    }

    #[test]
    fn test_denied_reply() {
        let mut response = granted();
        response.login = false;
        response.session = None;
        response.reason = Some("key".to_string());
        response.message = "Invalid password".to_string();
        response.sections.insert("login-flags", json!([]));

        let reply = decode(&build_login_reply(&response));

        assert_eq!(reply.as_struct().unwrap().len(), 3);
        assert_eq!(reply.member("login"), Some(&RpcValue::Bool(false)));
        assert_eq!(reply.member("reason"), Some(&RpcValue::from("key")));
        assert_eq!(reply.member("message"), Some(&RpcValue::from("Invalid password")));
    }
}
