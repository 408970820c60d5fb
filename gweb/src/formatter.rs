use colored::*;
use gweb_core::{
    client::DynamicCallError,
    descriptor::{Descriptor, SourceError},
    grpc_web::{codec::Status, transport::TransportError},
    reflection::client::ReflectionError,
    prost_reflect::{
        DynamicMessage, EnumDescriptor, FieldDescriptor, Kind, MapKey, MessageDescriptor,
        MethodDescriptor, ServiceDescriptor, Value,
    },
};
use std::collections::HashMap;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<String>);

/// A non-OK status returned by the server.
pub struct StatusReport(pub Status);

pub struct Trailers<'a>(pub &'a HashMap<String, String>);

/// A response message rendered field by field, optionally numbered within a stream.
pub struct TextMessage<'a>(pub &'a DynamicMessage, pub Option<usize>);

/// A method lookup failure, with the services whose name resembles the requested one.
pub struct MethodNotFound {
    pub error: SourceError,
    pub service: String,
    pub available: Vec<String>,
}

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<StatusReport> for FormattedString {
    fn from(StatusReport(status): StatusReport) -> Self {
        let mut out = format!(
            "{}\n  Code: {}\n  Number: {}",
            "gRPC Failed:".red().bold(),
            status.code_name().yellow(),
            status.code
        );

        if !status.message.is_empty() {
            out.push_str(&format!("\n  Message: {}", status.message));
        }

        if let Some(hint) = status_hint(status.code) {
            out.push_str(&format!("\n\n{} {hint}", "Hint:".cyan()));
        }

        FormattedString(out)
    }
}

fn status_hint(code: i32) -> Option<&'static str> {
    match code {
        3 => Some("Check the request JSON matches the expected message format"),
        4 => Some("Try increasing the timeout with --max-time"),
        5 => Some("Verify the service and method names are correct"),
        7 => Some("Check if the provided credentials have access to this method"),
        14 => Some("The service may be down or unreachable. Check the server address."),
        16 => Some("Add an authentication header with -H 'Authorization: Bearer <token>'"),
        _ => None,
    }
}

impl From<Trailers<'_>> for FormattedString {
    fn from(Trailers(trailers): Trailers<'_>) -> Self {
        let mut entries: Vec<_> = trailers.iter().collect();
        entries.sort();

        let mut out = "Trailers:".cyan().to_string();
        for (key, value) in entries {
            out.push_str(&format!("\n  {}: {}", key.green(), value));
        }

        FormattedString(out)
    }
}

impl From<TextMessage<'_>> for FormattedString {
    fn from(TextMessage(message, number): TextMessage<'_>) -> Self {
        let mut out = String::new();

        if let Some(n) = number {
            out.push_str(&format!("--- Message {n} ---\n"));
        }

        write_text_message(message, "", &mut out);

        FormattedString(out.trim_end().to_string())
    }
}

fn write_text_message(message: &DynamicMessage, indent: &str, out: &mut String) {
    for (field, value) in message.fields() {
        match value {
            Value::List(items) => {
                for item in items {
                    write_text_field(&field, field.name(), item, indent, out);
                }
            }
            Value::Map(entries) => {
                let value_field = field
                    .kind()
                    .as_message()
                    .map(|entry| entry.map_entry_value_field());

                for (key, item) in entries {
                    let name = format!("{}[{}]", field.name(), map_key_text(key));

                    match &value_field {
                        Some(value_field) => {
                            write_text_field(value_field, &name, item, indent, out)
                        }
                        None => out.push_str(&format!("{indent}{name}: {item:?}\n")),
                    }
                }
            }
            value => write_text_field(&field, field.name(), value, indent, out),
        }
    }
}

fn write_text_field(
    field: &FieldDescriptor,
    name: &str,
    value: &Value,
    indent: &str,
    out: &mut String,
) {
    match value {
        Value::Message(nested) => {
            out.push_str(&format!("{indent}{name} {{\n"));
            write_text_message(nested, &format!("{indent}  "), out);
            out.push_str(&format!("{indent}}}\n"));
        }
        Value::EnumNumber(number) => {
            let label = field
                .kind()
                .as_enum()
                .and_then(|e| e.get_value(*number))
                .map(|v| v.name().to_string())
                .unwrap_or_else(|| number.to_string());

            out.push_str(&format!("{indent}{name}: {label}\n"));
        }
        Value::Bytes(bytes) => {
            out.push_str(&format!("{indent}{name}: <bytes, len={}>\n", bytes.len()));
        }
        Value::String(s) => out.push_str(&format!("{indent}{name}: {s}\n")),
        Value::Bool(v) => out.push_str(&format!("{indent}{name}: {v}\n")),
        Value::I32(v) => out.push_str(&format!("{indent}{name}: {v}\n")),
        Value::I64(v) => out.push_str(&format!("{indent}{name}: {v}\n")),
        Value::U32(v) => out.push_str(&format!("{indent}{name}: {v}\n")),
        Value::U64(v) => out.push_str(&format!("{indent}{name}: {v}\n")),
        Value::F32(v) => out.push_str(&format!("{indent}{name}: {v}\n")),
        Value::F64(v) => out.push_str(&format!("{indent}{name}: {v}\n")),
        Value::List(_) | Value::Map(_) => out.push_str(&format!("{indent}{name}: {value:?}\n")),
    }
}

fn map_key_text(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

impl From<DynamicCallError> for FormattedString {
    fn from(err: DynamicCallError) -> Self {
        match err {
            DynamicCallError::Source(err) => FormattedString::from(err),
            DynamicCallError::Transport(err) => FormattedString::from(err),
            err => FormattedString(format!("{}\n\n'{}'", "Call Failed:".red().bold(), err)),
        }
    }
}

impl From<TransportError> for FormattedString {
    fn from(err: TransportError) -> Self {
        let hints = match &err {
            TransportError::Tls(_) | TransportError::Request(_) if is_tls_error(&err) => {
                "\n\nHints:\n  - Use -k/--insecure to skip certificate verification\n  - Use --cacert to specify a CA certificate"
            }
            TransportError::HttpStatus(_) => {
                "\n\nHint: Check that the URL points to a gRPC-Web endpoint (a proxy such as Envoy, or a server with gRPC-Web enabled)"
            }
            _ => "",
        };

        FormattedString(format!(
            "{}\n\n'{}'{}",
            "Request Failed:".red().bold(),
            err,
            hints
        ))
    }
}

fn is_tls_error(err: &TransportError) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(err);

    while let Some(err) = source {
        let text = err.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("tls") {
            return true;
        }
        source = err.source();
    }

    false
}

impl From<SourceError> for FormattedString {
    fn from(err: SourceError) -> Self {
        let hints = match &err {
            SourceError::Reflection(ReflectionError::MissingDependency { .. }) => {
                "\n\nHint: The server cannot serve every imported file, try providing a descriptor set with --file-descriptor-set"
            }
            SourceError::Reflection(_) => {
                "\n\nHints:\n  - The server may not have reflection enabled\n  - Try providing a descriptor set with --file-descriptor-set\n  - Check if authentication is required (-H 'Authorization: Bearer <token>')"
            }
            SourceError::InvalidMethodPath(_) => {
                "\n\nExamples:\n  messages.UserService/GetUser\n  helloworld.Greeter/SayHello"
            }
            _ => "",
        };

        FormattedString(format!(
            "{}\n\n'{}'{}",
            "Symbol Lookup Failed:".red().bold(),
            err,
            hints
        ))
    }
}

impl From<MethodNotFound> for FormattedString {
    fn from(not_found: MethodNotFound) -> Self {
        let needle = not_found.service.to_lowercase();

        let similar: Vec<&String> = not_found
            .available
            .iter()
            .filter(|svc| !needle.is_empty() && svc.to_lowercase().contains(&needle))
            .collect();

        let mut out = format!(
            "{}\n\n'{}'",
            "Symbol Lookup Failed:".red().bold(),
            not_found.error
        );

        if !similar.is_empty() {
            out.push_str("\n\nDid you mean one of these services?");
            for svc in similar {
                out.push_str(&format!("\n  - {}", svc.green()));
            }
        } else if !not_found.available.is_empty() {
            out.push_str("\n\nAvailable services:");
            for svc in &not_found.available {
                out.push_str(&format!("\n  - {}", svc.green()));
            }
        }

        FormattedString(out)
    }
}

impl From<anyhow::Error> for FormattedString {
    fn from(err: anyhow::Error) -> Self {
        FormattedString(format!("{}\n\n'{:#}'", "Error:".red().bold(), err))
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in services {
            out.push_str(&format!("  - {}\n", svc.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<Descriptor> for FormattedString {
    fn from(descriptor: Descriptor) -> Self {
        match descriptor {
            Descriptor::ServiceDescriptor(d) => FormattedString::from(d),
            Descriptor::MethodDescriptor(d) => FormattedString::from(d),
            Descriptor::MessageDescriptor(d) => FormattedString::from(d),
            Descriptor::EnumDescriptor(d) => FormattedString::from(d),
        }
    }
}

impl From<ServiceDescriptor> for FormattedString {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = format!(
            "{} {} {{\n",
            "service".cyan(),
            service.full_name().green()
        );

        for method in service.methods() {
            out.push_str(&format!("  {}\n", rpc_signature(&method)));
        }

        out.push('}');
        FormattedString(out)
    }
}

impl From<MethodDescriptor> for FormattedString {
    fn from(method: MethodDescriptor) -> Self {
        let kind = match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => "unary",
            (false, true) => "server streaming",
            (true, false) => "client streaming (not supported over gRPC-Web)",
            (true, true) => "bidirectional streaming (not supported over gRPC-Web)",
        };

        FormattedString(format!(
            "{}\n\n{} {}/{}\n{} {}",
            rpc_signature(&method),
            "//".dimmed(),
            method.parent_service().full_name(),
            method.name(),
            "//".dimmed(),
            kind.dimmed()
        ))
    }
}

fn rpc_signature(method: &MethodDescriptor) -> String {
    let stream = |enabled: bool| {
        if enabled {
            format!("{} ", "stream".cyan())
        } else {
            String::new()
        }
    };

    format!(
        "{} {}({}{}) {} ({}{});",
        "rpc".cyan(),
        method.name().green(),
        stream(method.is_client_streaming()),
        method.input().full_name().yellow(),
        "returns".cyan(),
        stream(method.is_server_streaming()),
        method.output().full_name().yellow()
    )
}

impl From<MessageDescriptor> for FormattedString {
    fn from(message: MessageDescriptor) -> Self {
        let mut out = format!(
            "{} {} {{\n",
            "message".cyan(),
            message.full_name().green()
        );

        for field in message.fields() {
            let type_name = if field.is_map() {
                map_type_name(&field)
            } else if field.is_list() {
                format!("{} {}", "repeated".cyan(), kind_name(&field.kind()))
            } else {
                kind_name(&field.kind())
            };

            let oneof = field
                .containing_oneof()
                .map(|o| format!(" {}", format!("// oneof {}", o.name()).dimmed()))
                .unwrap_or_default();

            out.push_str(&format!(
                "  {} {} = {};{}\n",
                type_name,
                field.name(),
                field.number(),
                oneof
            ));
        }

        out.push('}');
        FormattedString(out)
    }
}

fn map_type_name(field: &FieldDescriptor) -> String {
    match field.kind().as_message() {
        Some(entry) => format!(
            "map<{}, {}>",
            kind_name(&entry.map_entry_key_field().kind()),
            kind_name(&entry.map_entry_value_field().kind())
        ),
        None => kind_name(&field.kind()),
    }
}

fn kind_name(kind: &Kind) -> String {
    let name = match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Sint32 => "sint32",
        Kind::Sint64 => "sint64",
        Kind::Fixed32 => "fixed32",
        Kind::Fixed64 => "fixed64",
        Kind::Sfixed32 => "sfixed32",
        Kind::Sfixed64 => "sfixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message(m) => return m.full_name().yellow().to_string(),
        Kind::Enum(e) => return e.full_name().yellow().to_string(),
    };

    name.yellow().to_string()
}

impl From<EnumDescriptor> for FormattedString {
    fn from(enum_desc: EnumDescriptor) -> Self {
        let mut out = format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.full_name().green()
        );

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name(),
                val.number().to_string().purple()
            ));
        }
        out.push('}');

        FormattedString(out)
    }
}
