use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use stackable_managed_resources::{
    Client, ManagedResource, OwnerIdentity, ResourceGateway,
    client::{self, ClientOptions},
    gateway,
    k8s_openapi::api::{apps::v1::Deployment, core::v1::Service},
    logging,
};

const APP_NAME: &str = "resourcectl";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitLogging { source: logging::Error },

    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: client::Error },

    #[snafu(display("failed to look up {kind} {name:?}"))]
    Get {
        source: gateway::Error,
        kind: Kind,
        name: String,
    },

    #[snafu(display("{kind} {name:?} not found in namespace {namespace:?}"))]
    NotFound {
        kind: Kind,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    Delete {
        source: gateway::Error,
        kind: Kind,
        name: String,
    },

    #[snafu(display("failed to create owner reference"))]
    OwnerReference { source: gateway::Error },

    #[snafu(display("failed to serialize output"))]
    SerializeOutput { source: serde_yaml::Error },
}

/// Inspect and remove the child objects managed on behalf of a custom resource.
#[derive(Debug, Parser)]
#[command(name = APP_NAME, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    client: ClientOptions,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints a child object if it exists.
    Get { kind: Kind, name: String },

    /// Requests deletion of a child object. Succeeds if there is none.
    Delete { kind: Kind, name: String },

    /// Prints the owner reference pointing at the given owner.
    OwnerReference {
        #[arg(long)]
        uid: String,

        #[arg(long)]
        api_version: String,

        #[arg(long)]
        kind: String,

        #[arg(long)]
        name: String,

        /// Mark the owner as the controller of the child.
        #[arg(long)]
        controller: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum, strum::Display)]
#[strum(serialize_all = "PascalCase")]
enum Kind {
    Deployment,
    Service,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    logging::initialize_logging("RESOURCECTL_LOG", APP_NAME).context(InitLoggingSnafu)?;

    match cli.command {
        Command::OwnerReference {
            uid,
            api_version,
            kind,
            name,
            controller,
        } => {
            // Building a reference needs no cluster access
            let owner = OwnerIdentity::new(uid, api_version, kind, name);
            let owner_reference = if controller {
                gateway::create_controller_reference(&owner)
            } else {
                gateway::create_owner_reference(&owner)
            }
            .context(OwnerReferenceSnafu)?;
            print_yaml(&owner_reference)
        }
        Command::Get { kind, name } => {
            let gateway = connect(&cli.client).await?;
            match kind {
                Kind::Deployment => get::<Deployment>(&gateway, kind, name).await,
                Kind::Service => get::<Service>(&gateway, kind, name).await,
            }
        }
        Command::Delete { kind, name } => {
            let gateway = connect(&cli.client).await?;
            let result = match kind {
                Kind::Deployment => gateway.delete::<Deployment>(&name).await,
                Kind::Service => gateway.delete::<Service>(&name).await,
            };
            result.with_context(|_| DeleteSnafu {
                kind,
                name: name.clone(),
            })?;
            tracing::info!(%kind, %name, namespace = gateway.namespace(), "requested deletion");
            Ok(())
        }
    }
}

async fn connect(options: &ClientOptions) -> Result<ResourceGateway<Client>, Error> {
    let client = Client::try_from_options(options)
        .await
        .context(CreateClientSnafu)?;
    Ok(ResourceGateway::new(client))
}

async fn get<K: ManagedResource>(
    gateway: &ResourceGateway<Client>,
    kind: Kind,
    name: String,
) -> Result<(), Error> {
    let object = gateway
        .exists::<K>(&name)
        .await
        .with_context(|_| GetSnafu {
            kind,
            name: name.clone(),
        })?;

    match object {
        Some(object) => print_yaml(&object),
        None => NotFoundSnafu {
            kind,
            name,
            namespace: gateway.namespace(),
        }
        .fail(),
    }
}

fn print_yaml<T: Serialize>(value: &T) -> Result<(), Error> {
    let yaml = serde_yaml::to_string(value).context(SerializeOutputSnafu)?;
    print!("{yaml}");
    Ok(())
}
