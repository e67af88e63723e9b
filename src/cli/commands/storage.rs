//! storage commands - storage account creation

use std::sync::Arc;

use anyhow::bail;
use serde_json::json;

use super::name_of;
use crate::core::argument::{ArgumentDescriptor, DescriptorError, Value, ValueKind};
use crate::core::command::{handler, CommandDescriptor};
use crate::store::ResourceStore;

const ACCOUNT: &str = "storage-account";

pub const SKUS: &[&str] = &["Standard_LRS", "Standard_GRS", "Standard_ZRS", "Premium_LRS"];
pub const KINDS: &[&str] = &["StorageV2", "BlobStorage", "FileStorage"];

pub(super) fn commands(store: Arc<dyn ResourceStore>) -> Result<Vec<CommandDescriptor>, DescriptorError> {
    Ok(vec![create(store)?])
}

/// Storage account names are 3-24 lowercase letters and digits.
fn valid_account_name(name: &str) -> bool {
    (3..=24).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn create(store: Arc<dyn ResourceStore>) -> Result<CommandDescriptor, DescriptorError> {
    CommandDescriptor::builder(
        "storage account create",
        handler(move |args| {
            let name = name_of(args)?;
            if !valid_account_name(&name) {
                bail!("storage account name '{name}' must be 3-24 lowercase letters or digits");
            }
            if store.get(ACCOUNT, &name)?.is_some() {
                bail!("storage account '{name}' already exists");
            }

            let account = json!({
                "location": args.str("location")?,
                "sku": { "name": args.str("sku")? },
                "kind": args.str("kind")?,
                "enableHttpsTrafficOnly": args.flag("https_only")?,
                "primaryEndpoints": {
                    "blob": format!("https://{name}.blob.core.windows.net/"),
                },
            });
            Ok(store.put(ACCOUNT, &name, account)?)
        }),
    )
    .argument(
        ArgumentDescriptor::builder("--name")
            .alias("-n")
            .required()
            .help("The storage account name.")
            .build()?,
    )
    .argument(
        ArgumentDescriptor::builder("--location")
            .alias("-l")
            .required()
            .configured_default("location")
            .build()?,
    )
    .argument(
        ArgumentDescriptor::builder("--sku")
            .choices(SKUS.iter().copied())
            .default_value(Value::from(SKUS[0]))
            .build()?,
    )
    .argument(
        ArgumentDescriptor::builder("--kind")
            .choices(KINDS.iter().copied())
            .default_value(Value::from(KINDS[0]))
            .build()?,
    )
    .argument(
        ArgumentDescriptor::builder("--https-only")
            .kind(ValueKind::Bool)
            .default_value(Value::Bool(true))
            .help("Allow only HTTPS traffic.")
            .build()?,
    )
    .summary("Create a storage account.")
    .build()
}
