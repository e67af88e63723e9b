//! vm commands - create, show, list, start, update, delete virtual machines

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::bail;
use serde_json::json;

use super::{name_of, not_found};
use crate::core::argument::{
    ArgumentDescriptor, BlankBehavior, Completer, DescriptorError, Value, ValueKind,
};
use crate::core::command::{handler, CommandDescriptor};
use crate::engine::properties::set_property;
use crate::engine::update::{
    generic_update_arguments, FetchError, GenericUpdate, GENERIC_UPDATE_DESTS,
    GENERIC_UPDATE_GROUP,
};
use crate::store::ResourceStore;

const VM: &str = "vm";

pub const SIZES: &[&str] = &["Standard_B1s", "Standard_B2s", "Standard_D2s_v3", "Standard_D4s_v3"];

pub(super) fn commands(store: Arc<dyn ResourceStore>) -> Result<Vec<CommandDescriptor>, DescriptorError> {
    Ok(vec![
        create(store.clone())?,
        show(store.clone())?,
        list(store.clone())?,
        start(store.clone())?,
        update(store.clone())?,
        delete(store)?,
    ])
}

fn name_argument(store: &Arc<dyn ResourceStore>) -> Result<ArgumentDescriptor, DescriptorError> {
    ArgumentDescriptor::builder("--name")
        .alias("-n")
        .required()
        .help("Name of the virtual machine.")
        .completer(vm_names(store.clone()))
        .build()
}

fn vm_names(store: Arc<dyn ResourceStore>) -> Completer {
    Arc::new(move |partial: &str| {
        store
            .list(VM)
            .unwrap_or_default()
            .iter()
            .filter_map(|vm| vm["name"].as_str())
            .filter(|name| name.starts_with(partial))
            .map(str::to_string)
            .collect()
    })
}

fn size_argument(default: bool) -> Result<ArgumentDescriptor, DescriptorError> {
    let builder = ArgumentDescriptor::builder("--size")
        .choices(SIZES.iter().copied())
        .help("The VM size.");
    if default {
        builder.default_value(Value::from(SIZES[0])).build()
    } else {
        builder.build()
    }
}

fn tags_argument() -> Result<ArgumentDescriptor, DescriptorError> {
    ArgumentDescriptor::builder("--tags")
        .kind(ValueKind::list_of(ValueKind::String))
        .help("Space-separated tags: key[=value] [key[=value] ...]. Use \"\" to clear existing tags.")
        .build()
}

/// `key[=value]` tokens as a JSON object.
fn parse_tags(tokens: &[String]) -> serde_json::Value {
    let tags: BTreeMap<&str, &str> = tokens
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.split_once('=').unwrap_or((t.as_str(), "")))
        .collect();
    json!(tags)
}

fn create(store: Arc<dyn ResourceStore>) -> Result<CommandDescriptor, DescriptorError> {
    let name = name_argument(&store)?;
    CommandDescriptor::builder(
        "vm create",
        handler(move |args| {
            let name = name_of(args)?;
            if store.get(VM, &name)?.is_some() {
                bail!("virtual machine '{name}' already exists");
            }

            let vm = json!({
                "location": args.str("location")?,
                "hardwareProfile": { "vmSize": args.str("size")? },
                "storageProfile": { "imageReference": args.str("image")? },
                "osProfile": {
                    "adminUsername": args.str("admin_username")?,
                    "passwordAuthentication": args.str("admin_password")?.is_some(),
                },
                "networkProfile": {
                    "networkInterfaces": [{ "name": format!("{name}-nic"), "primary": true }],
                },
                "tags": parse_tags(&args.strings("tags")?),
                "powerState": "stopped",
            });
            Ok(store.put(VM, &name, vm)?)
        }),
    )
    .argument(name)
    .argument(
        ArgumentDescriptor::builder("--image")
            .default_value(Value::from("Ubuntu2204"))
            .help("The OS image.")
            .build()?,
    )
    .argument(size_argument(true)?)
    .argument(
        ArgumentDescriptor::builder("--location")
            .alias("-l")
            .required()
            .configured_default("location")
            .help("Location. Configure the default with `[defaults] location`.")
            .build()?,
    )
    .argument(tags_argument()?)
    .argument(
        ArgumentDescriptor::builder("--admin-username")
            .default_value(Value::from("azureuser"))
            .build()?,
    )
    .argument(
        ArgumentDescriptor::builder("--admin-password")
            .blank(BlankBehavior::PromptSecret {
                message: Some("Admin Password: ".into()),
                confirm: true,
            })
            .help("Password for the VM. Pass an empty value to be prompted.")
            .build()?,
    )
    .group("Authentication", &["admin_username", "admin_password"])
    .summary("Create a virtual machine.")
    .build()
}

fn show(store: Arc<dyn ResourceStore>) -> Result<CommandDescriptor, DescriptorError> {
    let name = name_argument(&store)?;
    CommandDescriptor::builder(
        "vm show",
        handler(move |args| {
            let name = name_of(args)?;
            store.get(VM, &name)?.ok_or_else(|| not_found(VM, &name))
        }),
    )
    .argument(name)
    .summary("Get the details of a virtual machine.")
    .build()
}

fn list(store: Arc<dyn ResourceStore>) -> Result<CommandDescriptor, DescriptorError> {
    CommandDescriptor::builder(
        "vm list",
        handler(move |args| {
            let location = args.str("location")?;
            let vms: Vec<serde_json::Value> = store
                .list(VM)?
                .into_iter()
                .filter(|vm| location.map_or(true, |l| vm["location"] == l))
                .collect();
            Ok(json!(vms))
        }),
    )
    .argument(
        ArgumentDescriptor::builder("--location")
            .alias("-l")
            .help("Only list virtual machines in this location.")
            .build()?,
    )
    .summary("List virtual machines.")
    .build()
}

fn start(store: Arc<dyn ResourceStore>) -> Result<CommandDescriptor, DescriptorError> {
    let completer = vm_names(store.clone());
    CommandDescriptor::builder(
        "vm start",
        handler(move |args| {
            let name = args
                .str("names")?
                .ok_or_else(|| anyhow::anyhow!("--names is required"))?;
            let mut vm = store.get(VM, name)?.ok_or_else(|| not_found(VM, name))?;
            vm.as_object_mut()
                .ok_or_else(|| anyhow::anyhow!("virtual machine '{name}' is not an object"))?
                .insert("powerState".into(), json!("running"));
            Ok(store.put(VM, name, vm)?)
        }),
    )
    .argument(
        ArgumentDescriptor::builder("--names")
            .kind(ValueKind::list_of(ValueKind::String))
            .required()
            .iterate()
            .help("Names of the virtual machines to start.")
            .completer(completer)
            .build()?,
    )
    .summary("Start one or more virtual machines.")
    .build()
}

fn update(store: Arc<dyn ResourceStore>) -> Result<CommandDescriptor, DescriptorError> {
    let name = name_argument(&store)?;
    let controller = Arc::new(
        GenericUpdate::<serde_json::Value>::new()
            .with_property_expressions()
            .setter("size", |vm, value, _| {
                set_property(vm, &format!("hardwareProfile.vmSize={value}"), true)?;
                Ok(())
            })
            .setter("tags", |vm, value, _| {
                let vm = vm
                    .as_object_mut()
                    .ok_or_else(|| anyhow::anyhow!("virtual machine is not an object"))?;
                vm.insert("tags".into(), parse_tags(&value.to_strings()));
                Ok(())
            }),
    );

    CommandDescriptor::builder(
        "vm update",
        handler(move |args| {
            let name = name_of(args)?;
            let updated = controller.update(
                || {
                    store
                        .get(VM, &name)
                        .map_err(|e| FetchError::Other(e.into()))?
                        .ok_or_else(|| FetchError::NotFound(format!("{VM}/{name}")))
                },
                |vm| Ok(store.put(VM, &name, vm)?),
                args,
            )?;
            Ok(updated)
        }),
    )
    .argument(name)
    .argument(size_argument(false)?)
    .argument(tags_argument()?)
    .arguments(generic_update_arguments()?)
    .group(GENERIC_UPDATE_GROUP, GENERIC_UPDATE_DESTS)
    .summary("Update the properties of a virtual machine.")
    .long_help(
        "Update the properties of a virtual machine.\n\n\
         Use --set, --add and --remove to change any property, for example\n\
         --set hardwareProfile.vmSize=Standard_B2s or\n\
         --add networkProfile.networkInterfaces name=nic2 primary=false",
    )
    .build()
}

fn delete(store: Arc<dyn ResourceStore>) -> Result<CommandDescriptor, DescriptorError> {
    let name = name_argument(&store)?;
    CommandDescriptor::builder(
        "vm delete",
        handler(move |args| {
            let name = name_of(args)?;
            if !store.delete(VM, &name)? {
                return Err(not_found(VM, &name));
            }
            Ok(serde_json::Value::Null)
        }),
    )
    .argument(name)
    .summary("Delete a virtual machine.")
    .build()
}
