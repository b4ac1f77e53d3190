use super::value::RpcValue;

pub trait RpcEncode {
    fn rpc_encode(&self, buf: &mut String);
}

/// Append `text` with the XML special characters escaped
pub fn escape_into(text: &str, buf: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}

impl RpcEncode for i32 {
    fn rpc_encode(&self, buf: &mut String) {
        let mut buffer = itoa::Buffer::new();
        buf.push_str("<value><int>");
        buf.push_str(buffer.format(*self));
        buf.push_str("</int></value>");
    }
}

impl RpcEncode for bool {
    fn rpc_encode(&self, buf: &mut String) {
        buf.push_str(if *self {
            "<value><boolean>1</boolean></value>"
        } else {
            "<value><boolean>0</boolean></value>"
        });
    }
}

impl RpcEncode for f64 {
    fn rpc_encode(&self, buf: &mut String) {
        buf.push_str("<value><double>");
        buf.push_str(&self.to_string());
        buf.push_str("</double></value>");
    }
}

impl RpcEncode for str {
    fn rpc_encode(&self, buf: &mut String) {
        buf.push_str("<value><string>");
        escape_into(self, buf);
        buf.push_str("</string></value>");
    }
}

impl RpcEncode for String {
    fn rpc_encode(&self, buf: &mut String) {
        self.as_str().rpc_encode(buf);
    }
}

impl RpcEncode for RpcValue {
    fn rpc_encode(&self, buf: &mut String) {
        match self {
            RpcValue::Int(i) => i.rpc_encode(buf),
            RpcValue::Bool(b) => b.rpc_encode(buf),
            RpcValue::Double(d) => d.rpc_encode(buf),
            RpcValue::String(s) => s.rpc_encode(buf),
            RpcValue::Array(items) => encode_array(items, buf),
            RpcValue::Struct(members) => {
                open_struct(buf);
                for (name, value) in members {
                    encode_member(name, value, buf);
                }
                close_struct(buf);
            }
            RpcValue::Nil => buf.push_str("<value><nil/></value>"),
        }
    }
}

pub fn encode_array<T: RpcEncode>(items: &[T], buf: &mut String) {
    buf.push_str("<value><array><data>");
    for item in items {
        item.rpc_encode(buf);
    }
    buf.push_str("</data></array></value>");
}

pub fn open_struct(buf: &mut String) {
    buf.push_str("<value><struct>");
}

pub fn close_struct(buf: &mut String) {
    buf.push_str("</struct></value>");
}

pub fn encode_member<V: RpcEncode + ?Sized>(name: &str, value: &V, buf: &mut String) {
    buf.push_str("<member><name>");
    escape_into(name, buf);
    buf.push_str("</name>");
    value.rpc_encode(buf);
    buf.push_str("</member>");
}

const PROLOG: &str = "<?xml version=\"1.0\"?>";

/// Wrap an already-encoded `<value>` as a successful method response
pub fn encode_method_response(value: &str) -> String {
    let mut buf = String::with_capacity(value.len() + 96);
    buf.push_str(PROLOG);
    buf.push_str("<methodResponse><params><param>");
    buf.push_str(value);
    buf.push_str("</param></params></methodResponse>");
    buf
}

pub fn encode_fault(code: i32, message: &str) -> String {
    let mut value = String::with_capacity(message.len() + 160);
    open_struct(&mut value);
    encode_member("faultCode", &code, &mut value);
    encode_member("faultString", message, &mut value);
    close_struct(&mut value);

    let mut buf = String::with_capacity(value.len() + 64);
    buf.push_str(PROLOG);
    buf.push_str("<methodResponse><fault>");
    buf.push_str(&value);
    buf.push_str("</fault></methodResponse>");
    buf
}

pub fn encode_method_call(method: &str, params: &[RpcValue]) -> String {
    let mut buf = String::with_capacity(256);
    buf.push_str(PROLOG);
    buf.push_str("<methodCall><methodName>");
    escape_into(method, &mut buf);
    buf.push_str("</methodName><params>");
    for param in params {
        buf.push_str("<param>");
        param.rpc_encode(&mut buf);
        buf.push_str("</param>");
    }
    buf.push_str("</params></methodCall>");
    buf
}
