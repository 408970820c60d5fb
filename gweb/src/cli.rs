//! # CLI
//!
//! This module defines the command-line interface of `gweb` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring headers are `key:value`);
use clap::{Args, Parser, Subcommand, ValueEnum};
use gweb_core::{descriptor::parse_service_method, grpc_web::codec::DEFAULT_MAX_MESSAGE_SIZE};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

#[derive(Parser)]
#[command(name = "gweb", version, about = "Dynamic gRPC-Web CLI")]
pub struct Cli {
    /// The server URL to send requests to (e.g. https://api.example.com)
    pub url: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Path to a binary FileDescriptorSet, disables server reflection (repeatable)
    #[arg(long = "file-descriptor-set", global = true)]
    pub file_descriptor_sets: Vec<PathBuf>,

    /// Enable debug logging and always show trailers
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Extra request header (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header, global = true)]
    pub headers: Vec<(String, String)>,

    /// Accept invalid TLS certificates
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,

    /// PEM encoded CA certificate to trust
    #[arg(long, global = true)]
    pub cacert: Option<PathBuf>,

    /// PEM encoded client certificate
    #[arg(long, global = true, requires = "key")]
    pub cert: Option<PathBuf>,

    /// PEM encoded client private key
    #[arg(long, global = true, requires = "cert")]
    pub key: Option<PathBuf>,

    /// Resolve host:port to the given address (e.g. api.example.com:443:127.0.0.1)
    #[arg(long, value_parser = parse_resolve, global = true)]
    pub resolve: Option<(String, SocketAddr)>,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 10, global = true)]
    pub connect_timeout: u64,

    /// Maximum time for the whole request in seconds
    #[arg(long, default_value_t = 30, global = true)]
    pub max_time: u64,

    /// Maximum size of a single response message in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE, global = true)]
    pub max_msg_size: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Perform a gRPC-Web call to a server
    ///
    /// Unary and server-streaming methods are supported.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// gweb https://api.example.com call my.pkg.Service/Method -d '{"key": "value"}'
    /// echo '{"key": "value"}' | gweb https://api.example.com call my.pkg.Service/Method -d @
    /// ```
    Call {
        /// Endpoint (package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        endpoint: (String, String),

        /// JSON request body, or '@' to read it from stdin
        #[arg(short, long)]
        data: String,

        /// Include fields set to their default value in the output
        #[arg(long)]
        emit_defaults: bool,

        /// Use the field names from the schema instead of lowerCamelCase
        #[arg(long)]
        use_proto_names: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Print the response trailers
        #[arg(long)]
        show_trailers: bool,
    },

    /// List the services available on the server
    List,

    /// Describe a service, method, message or enum
    ///
    /// Without a symbol, lists the available services.
    Describe {
        /// Fully qualified symbol name (e.g. my.package.Service or my.package.Service.Method)
        symbol: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (service, method) = parse_service_method(value).map_err(|e| {
        format!(
            "{e}\n\nExamples:\n  messages.UserService/GetUser\n  helloworld.Greeter/SayHello"
        )
    })?;

    Ok((service.to_string(), method.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_resolve(s: &str) -> Result<(String, SocketAddr), String> {
    let mut parts = s.splitn(3, ':');

    let (Some(host), Some(port), Some(addr)) = (parts.next(), parts.next(), parts.next()) else {
        return Err("Format must be 'host:port:address'".to_string());
    };

    let port: u16 = port
        .parse()
        .map_err(|e| format!("Invalid port '{port}': {e}"))?;

    let ip: IpAddr = addr
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .map_err(|e| format!("Invalid address '{addr}': {e}"))?;

    Ok((host.to_string(), SocketAddr::new(ip, port)))
}
