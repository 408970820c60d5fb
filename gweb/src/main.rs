//! # gweb CLI Entry Point
//!
//! The main executable for the gweb tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and sets up logging.
//! 2. **Schema**: Picks a descriptor source, local descriptor sets or server reflection.
//! 3. **Execution**: Delegates the request processing to the `GrpcWebClient`.
//! 4. **Presentation**: Formats and prints the resulting data or error status to standard output/error.
mod cli;
mod formatter;
mod source;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, ConnectionArgs, OutputFormat};
use formatter::{
    FormattedString, MethodNotFound, ServiceList, StatusReport, TextMessage, Trailers,
};
use gweb_core::{
    client::GrpcWebClient,
    descriptor::{DescriptorSource, FileSource, ReflectionSource, SourceError, load_descriptor_set},
    grpc_web::transport::{HttpTransport, TransportOptions},
    json::{JsonCodecError, JsonOptions, to_json},
    prost_reflect::DynamicMessage,
};
use source::Source;
use std::{path::PathBuf, process, time::Duration};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    init_tracing(args.verbose);

    let transport = build_transport(&args.url, &args.connection).unwrap_or_else(|err| exit(err));
    let source =
        load_source(&args.file_descriptor_sets, &transport).unwrap_or_else(|err| exit(err));

    match args.command {
        Commands::Call {
            endpoint,
            data,
            emit_defaults,
            use_proto_names,
            format,
            show_trailers,
        } => {
            let (service, method) = endpoint;

            let call = Call {
                service,
                method,
                data,
                format,
                json: JsonOptions {
                    emit_defaults,
                    use_proto_names,
                },
                show_trailers: show_trailers || args.verbose,
            };

            run_call(&transport, source, call).await
        }
        Commands::List | Commands::Describe { symbol: None } => list_services(&source).await,
        Commands::Describe {
            symbol: Some(symbol),
        } => describe(&source, &symbol).await,
    }
}

/// Prints `err` to stderr and exits with status 1.
fn exit(err: impl Into<FormattedString>) -> ! {
    eprintln!("{}", err.into());
    process::exit(1);
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "warn,gweb=debug,gweb_core=debug"
    } else {
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_transport(url: &str, args: &ConnectionArgs) -> anyhow::Result<HttpTransport> {
    let read = |path: &PathBuf| {
        std::fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))
    };

    let ca_certificate = args.cacert.as_ref().map(read).transpose()?;

    // reqwest expects the certificate chain and the private key in a single PEM buffer.
    let identity = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            let mut pem = read(cert)?;
            pem.push(b'\n');
            pem.extend(read(key)?);
            Some(pem)
        }
        _ => None,
    };

    let options = TransportOptions {
        timeout: Duration::from_secs(args.max_time),
        connect_timeout: Duration::from_secs(args.connect_timeout),
        max_message_size: args.max_msg_size,
        insecure: args.insecure,
        ca_certificate,
        identity,
        resolve: args.resolve.clone(),
        headers: args.headers.clone(),
        ..TransportOptions::default()
    };

    HttpTransport::new(url, options).with_context(|| format!("Failed to set up client for '{url}'"))
}

fn load_source<'a>(
    paths: &[PathBuf],
    transport: &'a HttpTransport,
) -> Result<Source<'a>, SourceError> {
    if paths.is_empty() {
        debug!(url = transport.base_url(), "Resolving schemas through server reflection");
        return Ok(Source::Reflection(ReflectionSource::new(transport)));
    }

    debug!(?paths, "Loading descriptor sets");

    let sets = paths
        .iter()
        .map(|path| load_descriptor_set(path))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Source::File(FileSource::from_file_descriptor_sets(sets)?))
}

async fn list_services(source: &Source<'_>) {
    match source.list_services().await {
        Ok(services) => println!("{}", FormattedString::from(ServiceList(services))),
        Err(err) => exit(err),
    }
}

async fn describe(source: &Source<'_>, symbol: &str) {
    match source.find_symbol(symbol).await {
        Ok(descriptor) => println!("{}", FormattedString::from(descriptor)),
        Err(err) => exit(err),
    }
}

struct Call {
    service: String,
    method: String,
    data: String,
    format: OutputFormat,
    json: JsonOptions,
    show_trailers: bool,
}

async fn run_call(transport: &HttpTransport, source: Source<'_>, call: Call) {
    let body = read_body(&call.data).unwrap_or_else(|err| exit(err));

    let client = GrpcWebClient::new(transport, source);

    let method = match client.source().find_method(&call.service, &call.method).await {
        Ok(method) => method,
        Err(err) if err.is_not_found() => {
            let available = client.source().list_services().await.unwrap_or_default();

            exit(MethodNotFound {
                error: err,
                service: call.service,
                available,
            })
        }
        Err(err) => exit(err),
    };

    let streaming = method.is_server_streaming();
    let mut count = 0;

    let result = client
        .invoke(method, body, Vec::new(), |message| {
            count += 1;
            print_message(message, call.format, call.json, streaming.then_some(count))
        })
        .await;

    let response = result.unwrap_or_else(|err| exit(err));

    if call.show_trailers && !response.trailers.is_empty() {
        eprintln!("{}", FormattedString::from(Trailers(&response.trailers)));
    }

    if !response.is_ok() {
        exit(StatusReport(response.status));
    }
}

fn print_message(
    message: &DynamicMessage,
    format: OutputFormat,
    json: JsonOptions,
    number: Option<usize>,
) -> Result<(), JsonCodecError> {
    match format {
        OutputFormat::Json => println!("{}", FormattedString::from(to_json(message, json)?)),
        OutputFormat::Text => println!("{}", FormattedString::from(TextMessage(message, number))),
    }

    Ok(())
}

fn read_body(data: &str) -> anyhow::Result<serde_json::Value> {
    let raw = if data == "@" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read request data from stdin")?
    } else {
        data.to_string()
    };

    let raw = raw.trim();

    if raw.is_empty() {
        anyhow::bail!("Request data is required, e.g. -d '{{\"id\": \"123\"}}'");
    }

    serde_json::from_str(raw).context("Invalid JSON request body")
}
