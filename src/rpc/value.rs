use serde_json::Value;

/// An XML-RPC value
#[derive(Clone, Debug, PartialEq)]
pub enum RpcValue {
    Int(i32),
    Bool(bool),
    Double(f64),
    String(String),
    Array(Vec<RpcValue>),
    /// Members keep their document order
    Struct(Vec<(String, RpcValue)>),
    Nil,
}

impl RpcValue {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcValue::Int(_) => "int",
            RpcValue::Bool(_) => "boolean",
            RpcValue::Double(_) => "double",
            RpcValue::String(_) => "string",
            RpcValue::Array(_) => "array",
            RpcValue::Struct(_) => "struct",
            RpcValue::Nil => "nil",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            RpcValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RpcValue]> {
        match self {
            RpcValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(String, RpcValue)]> {
        match self {
            RpcValue::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// First struct member with this name
    pub fn member(&self, name: &str) -> Option<&RpcValue> {
        self.as_struct()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl From<&str> for RpcValue {
    fn from(value: &str) -> Self {
        RpcValue::String(value.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(value: String) -> Self {
        RpcValue::String(value)
    }
}

impl From<i32> for RpcValue {
    fn from(value: i32) -> Self {
        RpcValue::Int(value)
    }
}

impl From<bool> for RpcValue {
    fn from(value: bool) -> Self {
        RpcValue::Bool(value)
    }
}

impl From<&Value> for RpcValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RpcValue::Nil,
            Value::Bool(b) => RpcValue::Bool(*b),
            Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => RpcValue::Int(i),
                None => RpcValue::Double(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => RpcValue::String(s.clone()),
            Value::Array(items) => RpcValue::Array(items.iter().map(RpcValue::from).collect()),
            Value::Object(map) => RpcValue::Struct(
                map.iter()
                    .map(|(k, v)| (k.clone(), RpcValue::from(v)))
                    .collect(),
            ),
        }
    }
}
