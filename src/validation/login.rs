use crate::core::error::LoginError;
use crate::models::login::LoginRequest;
use crate::rpc::encoder::encode_method_call;
use crate::rpc::parser::parse_method_call;
use crate::rpc::value::RpcValue;

pub const LOGIN_METHOD: &str = "login_to_simulator";

const STRING_FIELDS: &[&str] = &[
    "first",
    "last",
    "passwd",
    "start",
    "channel",
    "version",
    "platform",
    "platform_string",
    "platform_version",
    "mac",
    "id0",
    "host_id",
    "token",
    "mfa_hash",
];

fn malformed(message: String) -> LoginError {
    LoginError::MalformedRequest(message)
}

/// Typed view over the single struct parameter of a login call
struct Fields<'a> {
    members: &'a [(String, RpcValue)],
}

impl<'a> Fields<'a> {
    fn get(&self, name: &str) -> Result<&'a RpcValue, LoginError> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| malformed(format!("missing field '{}'", name)))
    }

    fn string(&self, name: &str) -> Result<String, LoginError> {
        let value = self.get(name)?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            malformed(format!("field '{}' must be a string, got {}", name, value.kind()))
        })
    }

    fn int(&self, name: &str) -> Result<i32, LoginError> {
        let value = self.get(name)?;
        value.as_i32().ok_or_else(|| {
            malformed(format!("field '{}' must be an int, got {}", name, value.kind()))
        })
    }

    /// Int or boolean; any non-zero int is true
    fn flag(&self, name: &str) -> Result<bool, LoginError> {
        match self.get(name)? {
            RpcValue::Int(i) => Ok(*i != 0),
            RpcValue::Bool(b) => Ok(*b),
            other => Err(malformed(format!(
                "field '{}' must be an int or boolean, got {}",
                name,
                other.kind()
            ))),
        }
    }

    fn string_list(&self, name: &str) -> Result<Vec<String>, LoginError> {
        let value = self.get(name)?;
        let items = value.as_array().ok_or_else(|| {
            malformed(format!("field '{}' must be an array, got {}", name, value.kind()))
        })?;

        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    malformed(format!(
                        "field '{}' entry {} must be a string, got {}",
                        name,
                        idx,
                        item.kind()
                    ))
                })
            })
            .collect()
    }
}

impl LoginRequest {
    /// Validate a decoded call. Fails before anything is looked up or stored.
    pub fn from_call(method: &str, params: &[RpcValue]) -> Result<Self, LoginError> {
        if method != LOGIN_METHOD {
            return Err(malformed(format!("unknown method '{}'", method)));
        }

        let members = match params {
            [RpcValue::Struct(members)] => members,
            [other] => {
                return Err(malformed(format!(
                    "login parameter must be a struct, got {}",
                    other.kind()
                )))
            }
            _ => {
                return Err(malformed(format!(
                    "expected exactly one parameter, got {}",
                    params.len()
                )))
            }
        };
        let fields = Fields { members };

        let request = LoginRequest {
            first: fields.string("first")?,
            last: fields.string("last")?,
            passwd: fields.string("passwd")?,
            start: fields.string("start")?,
            channel: fields.string("channel")?,
            version: fields.string("version")?,
            platform: fields.string("platform")?,
            platform_string: fields.string("platform_string")?,
            platform_version: fields.string("platform_version")?,
            mac: fields.string("mac")?,
            id0: fields.string("id0")?,
            host_id: fields.string("host_id")?,
            token: fields.string("token")?,
            mfa_hash: fields.string("mfa_hash")?,
            agree_to_tos: fields.flag("agree_to_tos")?,
            read_critical: fields.flag("read_critical")?,
            address_size: fields.int("address_size")?,
            extended_errors: fields.int("extended_errors")?,
            last_exec_duration: fields.int("last_exec_duration")?,
            last_exec_event: fields.int("last_exec_event")?,
            options: fields.string_list("options")?,
        };

        if request.first.trim().is_empty() || request.last.trim().is_empty() {
            return Err(malformed("first and last name must not be empty".to_string()));
        }

        Ok(request)
    }

    /// Parse and validate a raw XML-RPC login document
    pub fn decode(xml: &str) -> Result<Self, LoginError> {
        let (method, params) = parse_method_call(xml)?;
        Self::from_call(&method, &params)
    }

    /// Struct parameter as a client would send it
    pub fn to_rpc(&self) -> RpcValue {
        let strings = [
            &self.first,
            &self.last,
            &self.passwd,
            &self.start,
            &self.channel,
            &self.version,
            &self.platform,
            &self.platform_string,
            &self.platform_version,
            &self.mac,
            &self.id0,
            &self.host_id,
            &self.token,
            &self.mfa_hash,
        ];

        let mut members: Vec<(String, RpcValue)> = STRING_FIELDS
            .iter()
            .zip(strings)
            .map(|(name, value)| (name.to_string(), RpcValue::String(value.clone())))
            .collect();

        members.push(("agree_to_tos".to_string(), RpcValue::Int(self.agree_to_tos as i32)));
        members.push(("read_critical".to_string(), RpcValue::Int(self.read_critical as i32)));
        members.push(("address_size".to_string(), RpcValue::Int(self.address_size)));
        members.push(("extended_errors".to_string(), RpcValue::Int(self.extended_errors)));
        members.push(("last_exec_duration".to_string(), RpcValue::Int(self.last_exec_duration)));
        members.push(("last_exec_event".to_string(), RpcValue::Int(self.last_exec_event)));
        members.push((
            "options".to_string(),
            RpcValue::Array(self.options.iter().cloned().map(RpcValue::String).collect()),
        ));

        RpcValue::Struct(members)
    }

    /// Encode as a complete `login_to_simulator` method call
    pub fn to_call(&self) -> String {
        encode_method_call(LOGIN_METHOD, &[self.to_rpc()])
    }
}

#[cfg(test)]
pub(crate) fn sample_request(first: &str, last: &str, options: &[&str]) -> LoginRequest {
    LoginRequest {
        first: first.to_string(),
        last: last.to_string(),
        passwd: "secret".to_string(),
        start: "last".to_string(),
        channel: "Test Viewer".to_string(),
        version: "7.1.2".to_string(),
        platform: "lnx".to_string(),
        platform_string: "Linux 6.1".to_string(),
        platform_version: "6.1.0".to_string(),
        mac: "00:11:22:33:44:55".to_string(),
        id0: "id0-hash".to_string(),
        host_id: String::new(),
        token: String::new(),
        mfa_hash: String::new(),
        agree_to_tos: true,
        read_critical: true,
        address_size: 64,
        extended_errors: 1,
        last_exec_duration: 0,
        last_exec_event: 0,
        options: options.iter().map(|o| o.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_without(field: &str) -> String {
        let request = sample_request("Jane", "Doe", &[]);
        let members = match request.to_rpc() {
            RpcValue::Struct(members) => members
                .into_iter()
                .filter(|(n, _)| n != field)
                .collect(),
            _ => unreachable!(),
        };
        encode_method_call(LOGIN_METHOD, &[RpcValue::Struct(members)])
    }

    fn replace_field(field: &str, value: RpcValue) -> Vec<RpcValue> {
        let request = sample_request("Jane", "Doe", &[]);
        match request.to_rpc() {
            RpcValue::Struct(members) => vec![RpcValue::Struct(
                members
                    .into_iter()
                    .map(|(n, v)| if n == field { (n, value.clone()) } else { (n, v) })
                    .collect(),
            )],
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_decode_of_encoded_call_preserves_fields() {
        let request = sample_request("Jane", "Doe", &["inventory-root", "login-flags", "login-flags"]);

        let decoded = LoginRequest::decode(&request.to_call()).unwrap();

        assert_eq!(decoded, request);
    }

    #[test]
    fn test_every_field_is_required() {
        for field in STRING_FIELDS
            .iter()
            .chain(["agree_to_tos", "read_critical", "address_size", "options"].iter())
        {
            let err = LoginRequest::decode(&call_without(field)).unwrap_err();
            match err {
                LoginError::MalformedRequest(msg) => assert!(msg.contains(field), "{}", msg),
                other => panic!("Expected MalformedRequest, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_flags_accept_boolean() {
        let params = replace_field("agree_to_tos", RpcValue::Bool(false));
        let request = LoginRequest::from_call(LOGIN_METHOD, &params).unwrap();
        assert!(!request.agree_to_tos);

        let params = replace_field("read_critical", RpcValue::Int(5));
        assert!(LoginRequest::from_call(LOGIN_METHOD, &params).unwrap().read_critical);
    }

    #[test]
    fn test_mistyped_fields_rejected() {
        let params = replace_field("address_size", RpcValue::from("64"));
        assert!(matches!(
            LoginRequest::from_call(LOGIN_METHOD, &params),
            Err(LoginError::MalformedRequest(_))
        ));

        let params = replace_field("first", RpcValue::Int(1));
        assert!(LoginRequest::from_call(LOGIN_METHOD, &params).is_err());

        let params = replace_field("options", RpcValue::Array(vec![RpcValue::Int(1)]));
        assert!(LoginRequest::from_call(LOGIN_METHOD, &params).is_err());

        let params = replace_field("agree_to_tos", RpcValue::from("yes"));
        assert!(LoginRequest::from_call(LOGIN_METHOD, &params).is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        let params = replace_field("first", RpcValue::from("  "));
        assert!(LoginRequest::from_call(LOGIN_METHOD, &params).is_err());
    }

    #[test]
    fn test_wrong_method_and_arity() {
        let request = sample_request("Jane", "Doe", &[]);

        assert!(LoginRequest::from_call("logout", &[request.to_rpc()]).is_err());
        assert!(LoginRequest::from_call(LOGIN_METHOD, &[]).is_err());
        assert!(LoginRequest::from_call(LOGIN_METHOD, &[RpcValue::from("x")]).is_err());
        assert!(LoginRequest::from_call(LOGIN_METHOD, &[request.to_rpc(), request.to_rpc()]).is_err());
    }

    #[test]
    fn test_unparseable_document_is_malformed() {
        assert!(matches!(
            LoginRequest::decode("<methodCall><methodName>"),
            Err(LoginError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_empty_options_allowed() {
        let request = LoginRequest::decode(&sample_request("Jane", "Doe", &[]).to_call()).unwrap();
        assert!(request.options.is_empty());
    }
}
