use super::value::RpcValue;
use crate::core::error::RpcParseError;

const MAX_DEPTH: usize = 64;

#[derive(Debug, PartialEq)]
enum Event {
    Start(String),
    End(String),
    /// Self-closing element
    Empty(String),
    Text(String),
    Eof,
}

fn describe(event: &Event) -> String {
    match event {
        Event::Start(name) => format!("<{}>", name),
        Event::End(name) => format!("</{}>", name),
        Event::Empty(name) => format!("<{}/>", name),
        Event::Text(_) => "text".to_string(),
        Event::Eof => "end of document".to_string(),
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn skip_past(&mut self, terminator: &str, what: &'static str) -> Result<&'a str, RpcParseError> {
        let rest = &self.src[self.pos..];
        let idx = rest.find(terminator).ok_or(RpcParseError::UnexpectedEof(what))?;
        self.pos += idx + terminator.len();
        Ok(&rest[..idx])
    }

    fn next_event(&mut self) -> Result<Event, RpcParseError> {
        loop {
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return Ok(Event::Eof);
            }

            if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let text = self.skip_past("]]>", "CDATA section")?;
                return Ok(Event::Text(text.to_string()));
            } else if rest.starts_with("<!") {
                self.skip_past(">", "declaration")?;
            } else if rest.starts_with("</") {
                self.pos += 2;
                let name = self.skip_past(">", "closing tag")?;
                return Ok(Event::End(name.trim().to_string()));
            } else if rest.starts_with('<') {
                self.pos += 1;
                let inner = self.skip_past(">", "tag")?;
                let self_closing = inner.ends_with('/');
                let name = inner
                    .trim_end_matches('/')
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_string();
                return Ok(if self_closing {
                    Event::Empty(name)
                } else {
                    Event::Start(name)
                });
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                self.pos += end;
                return Ok(Event::Text(unescape(&rest[..end])?));
            }
        }
    }
}

/// Resolve the five named entities and numeric character references
fn unescape(raw: &str) -> Result<String, RpcParseError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| RpcParseError::UnknownEntity(after.to_string()))?;
        let entity = &after[..semi];

        let ch = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| RpcParseError::UnknownEntity(entity.to_string()))?
            }
        };

        out.push(ch);
        rest = &after[semi + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Event>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            lexer: Lexer { src, pos: 0 },
            peeked: None,
        }
    }

    fn next(&mut self) -> Result<Event, RpcParseError> {
        match self.peeked.take() {
            Some(event) => Ok(event),
            None => self.lexer.next_event(),
        }
    }

    fn peek(&mut self) -> Result<&Event, RpcParseError> {
        let event = match self.peeked.take() {
            Some(event) => event,
            None => self.lexer.next_event()?,
        };
        Ok(self.peeked.insert(event))
    }

    fn skip_whitespace(&mut self) -> Result<(), RpcParseError> {
        loop {
            let blank = matches!(self.peek()?, Event::Text(t) if t.trim().is_empty());
            if !blank {
                return Ok(());
            }
            self.next()?;
        }
    }

    /// Concatenated text up to the next tag
    fn text(&mut self) -> Result<String, RpcParseError> {
        let mut text = String::new();
        loop {
            let is_text = matches!(self.peek()?, Event::Text(_));
            if !is_text {
                return Ok(text);
            }
            if let Event::Text(t) = self.next()? {
                text.push_str(&t);
            }
        }
    }

    fn expect_start(&mut self, name: &str) -> Result<(), RpcParseError> {
        self.skip_whitespace()?;
        match self.next()? {
            Event::Start(n) if n == name => Ok(()),
            other => Err(unexpected(&format!("<{}>", name), &other)),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<(), RpcParseError> {
        self.skip_whitespace()?;
        match self.next()? {
            Event::End(n) if n == name => Ok(()),
            other => Err(unexpected(&format!("</{}>", name), &other)),
        }
    }

    /// True if the next non-blank event closes `name`
    fn at_end(&mut self, name: &str) -> Result<bool, RpcParseError> {
        self.skip_whitespace()?;
        Ok(matches!(self.peek()?, Event::End(n) if n == name))
    }

    fn value(&mut self, depth: usize) -> Result<RpcValue, RpcParseError> {
        if depth > MAX_DEPTH {
            return Err(RpcParseError::TooDeep(MAX_DEPTH));
        }

        self.skip_whitespace()?;
        match self.next()? {
            Event::Start(n) if n == "value" => {}
            Event::Empty(n) if n == "value" => return Ok(RpcValue::String(String::new())),
            other => return Err(unexpected("<value>", &other)),
        }

        let text = self.text()?;
        let blank = text.trim().is_empty();

        match self.next()? {
            // No type element means string
            Event::End(n) if n == "value" => Ok(RpcValue::String(text)),
            Event::Start(tag) if blank => {
                let value = self.typed(&tag, depth)?;
                self.expect_end("value")?;
                Ok(value)
            }
            Event::Empty(tag) if blank => {
                let value = empty_typed(&tag)?;
                self.expect_end("value")?;
                Ok(value)
            }
            other => Err(unexpected("</value> or a type element", &other)),
        }
    }

    fn typed(&mut self, tag: &str, depth: usize) -> Result<RpcValue, RpcParseError> {
        let value = match tag {
            "int" | "i4" | "i8" => {
                let text = self.text()?;
                let parsed = text
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|i| i32::try_from(i).ok())
                    .ok_or(RpcParseError::InvalidScalar { kind: "int", text })?;
                RpcValue::Int(parsed)
            }
            "boolean" => {
                let text = self.text()?;
                match text.trim() {
                    "1" | "true" => RpcValue::Bool(true),
                    "0" | "false" => RpcValue::Bool(false),
                    _ => return Err(RpcParseError::InvalidScalar { kind: "boolean", text }),
                }
            }
            "double" => {
                let text = self.text()?;
                let parsed = text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| RpcParseError::InvalidScalar { kind: "double", text: text.clone() })?;
                RpcValue::Double(parsed)
            }
            "string" | "dateTime.iso8601" | "base64" => RpcValue::String(self.text()?),
            "nil" => RpcValue::Nil,
            "array" => {
                let mut items = Vec::new();
                self.skip_whitespace()?;
                match self.next()? {
                    Event::Empty(n) if n == "data" => {}
                    Event::Start(n) if n == "data" => {
                        while !self.at_end("data")? {
                            items.push(self.value(depth + 1)?);
                        }
                        self.expect_end("data")?;
                    }
                    other => return Err(unexpected("<data>", &other)),
                }
                RpcValue::Array(items)
            }
            "struct" => {
                let mut members = Vec::new();
                while !self.at_end("struct")? {
                    self.expect_start("member")?;
                    self.expect_start("name")?;
                    let name = self.text()?;
                    self.expect_end("name")?;
                    let value = self.value(depth + 1)?;
                    self.expect_end("member")?;
                    members.push((name, value));
                }
                RpcValue::Struct(members)
            }
            other => {
                return Err(RpcParseError::Unexpected {
                    expected: "a value type".to_string(),
                    found: format!("<{}>", other),
                })
            }
        };

        self.expect_end(tag)?;
        Ok(value)
    }

    fn params(&mut self) -> Result<Vec<RpcValue>, RpcParseError> {
        self.skip_whitespace()?;
        let (open, empty) = match self.peek()? {
            Event::Start(n) => (n == "params", false),
            Event::Empty(n) => (false, n == "params"),
            _ => (false, false),
        };
        if empty {
            self.next()?;
        }
        if !open {
            return Ok(Vec::new());
        }
        self.next()?;

        let mut params = Vec::new();
        while !self.at_end("params")? {
            self.expect_start("param")?;
            params.push(self.value(0)?);
            self.expect_end("param")?;
        }
        self.expect_end("params")?;

        Ok(params)
    }
}

fn empty_typed(tag: &str) -> Result<RpcValue, RpcParseError> {
    match tag {
        "nil" => Ok(RpcValue::Nil),
        "string" | "dateTime.iso8601" | "base64" => Ok(RpcValue::String(String::new())),
        "array" => Ok(RpcValue::Array(Vec::new())),
        "struct" => Ok(RpcValue::Struct(Vec::new())),
        "int" | "i4" | "i8" => Err(RpcParseError::InvalidScalar { kind: "int", text: String::new() }),
        "boolean" => Err(RpcParseError::InvalidScalar { kind: "boolean", text: String::new() }),
        "double" => Err(RpcParseError::InvalidScalar { kind: "double", text: String::new() }),
        other => Err(RpcParseError::Unexpected {
            expected: "a value type".to_string(),
            found: format!("<{}/>", other),
        }),
    }
}

fn unexpected(expected: &str, found: &Event) -> RpcParseError {
    match found {
        Event::Eof => RpcParseError::UnexpectedEof("document"),
        other => RpcParseError::Unexpected {
            expected: expected.to_string(),
            found: describe(other),
        },
    }
}

/// Decoded method response
#[derive(Debug, PartialEq)]
pub enum RpcResponse {
    Success(RpcValue),
    Fault { code: i32, message: String },
}

/// Parse a `<methodCall>` into its method name and positional parameters
pub fn parse_method_call(xml: &str) -> Result<(String, Vec<RpcValue>), RpcParseError> {
    let mut parser = Parser::new(xml);

    parser.expect_start("methodCall")?;
    parser.expect_start("methodName")?;
    let method = parser.text()?.trim().to_string();
    parser.expect_end("methodName")?;

    let params = parser.params()?;
    parser.expect_end("methodCall")?;

    Ok((method, params))
}

/// Parse a `<methodResponse>`; a well-formed fault is returned, not raised
pub fn parse_method_response(xml: &str) -> Result<RpcResponse, RpcParseError> {
    let mut parser = Parser::new(xml);

    parser.expect_start("methodResponse")?;
    parser.skip_whitespace()?;

    let is_fault = matches!(parser.peek()?, Event::Start(n) if n == "fault");
    let response = if is_fault {
        parser.next()?;
        let value = parser.value(0)?;
        parser.expect_end("fault")?;

        let code = value
            .member("faultCode")
            .and_then(RpcValue::as_i32)
            .ok_or(RpcParseError::InvalidScalar {
                kind: "faultCode",
                text: String::new(),
            })?;
        let message = value
            .member("faultString")
            .and_then(RpcValue::as_str)
            .unwrap_or_default()
            .to_string();
        RpcResponse::Fault { code, message }
    } else {
        let mut params = parser.params()?;
        if params.len() != 1 {
            return Err(RpcParseError::Unexpected {
                expected: "exactly one response parameter".to_string(),
                found: format!("{} parameters", params.len()),
            });
        }
        RpcResponse::Success(params.remove(0))
    };

    parser.expect_end("methodResponse")?;
    Ok(response)
}
