use std::{path::PathBuf, sync::Arc};

use bucketplay::{
    acl::{self, Permission},
    store::{disk::DiskStore, ObjectStore, ObjectStoreInstance},
    CompletionGate,
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about=None)]
struct Cli {
    /// Directory backing the on-disk store
    #[clap(long, default_value = "bucketplay-data")]
    root: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    MakeBucket {
        bucket: String,
    },
    Upload {
        bucket: String,
        key: String,
        file: PathBuf,
    },
    GrantBucket {
        bucket: String,
        grantee: String,
        #[clap(default_value = "READ")]
        permission: String,
    },
    GrantObject {
        bucket: String,
        key: String,
        grantee: String,
        #[clap(default_value = "READ")]
        permission: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();
    let store = DiskStore::instantiate(&cli.root)?;

    match cli.command {
        Command::MakeBucket { bucket } => {
            store.create_bucket(&bucket).await?;
            println!("Created bucket {}", bucket);
        }
        Command::Upload { bucket, key, file } => upload(store, &bucket, &key, file).await?,
        Command::GrantBucket {
            bucket,
            grantee,
            permission,
        } => {
            let policy = acl::grant_on_bucket(
                store.as_ref(),
                &bucket,
                &grantee,
                Permission::from_name(&permission),
            )
            .await?;
            print_policy(&policy);
        }
        Command::GrantObject {
            bucket,
            key,
            grantee,
            permission,
        } => {
            let policy = acl::grant_on_object(
                store.as_ref(),
                &bucket,
                &key,
                &grantee,
                Permission::from_name(&permission),
            )
            .await?;
            print_policy(&policy);
        }
    };

    Ok(())
}

async fn upload(
    store: ObjectStoreInstance,
    bucket: &str,
    key: &str,
    file: PathBuf,
) -> anyhow::Result<()> {
    let gate = CompletionGate::new();
    if !gate.submit(Arc::clone(&store), bucket, key, &file).await {
        anyhow::bail!("upload of {} was not started", file.display());
    }
    println!("Waiting for file upload to complete...");
    gate.await_completion().await;
    println!("File upload completed");
    Ok(())
}

fn print_policy(policy: &acl::AccessControlPolicy) {
    println!("Owner: {} '{}'", policy.owner.id, policy.owner.display_name);
    for grant in &policy.grants {
        println!(
            "  Grantee: {} '{}' Permission: {}",
            grant.grantee.id, grant.grantee.display_name, grant.permission
        );
    }
}
