use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use confman::{
    ConfigSections, ConfigSectionsMut, Configuration, GroupMut, GroupRegistry, GroupRegistryMut,
    Options, PropertyMap, Section, SectionKind, SectionRegistry, SectionRegistryMut, TypedValue,
};
use serde_json::{Map, Value, json};

use crate::cli::{Cli, Command};

const OPTIONS_FILE: &str = "confman.toml";

pub fn run(cli: Cli) -> Result<()> {
    let mut options = load_options(&cli.file, cli.options.as_deref())?;
    if cli.auto_save {
        options.auto_save = true;
    }
    let mut config = Configuration::open_with(&cli.file, &options)
        .with_context(|| format!("failed to open {}", cli.file.display()))?;

    let save_at_end = cli.command.mutates() && !config.auto_save();
    execute(&mut config, cli.command)?;
    if save_at_end {
        config
            .save()
            .with_context(|| format!("failed to save {}", cli.file.display()))?;
        debug!("saved {}", cli.file.display());
    }
    Ok(())
}

fn load_options(file: &Path, explicit: Option<&Path>) -> Result<Options> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let beside: PathBuf = file
                .parent()
                .map(|dir| dir.join(OPTIONS_FILE))
                .unwrap_or_else(|| PathBuf::from(OPTIONS_FILE));
            if !beside.exists() {
                return Ok(Options::default());
            }
            beside
        }
    };
    Options::load(&path).with_context(|| format!("failed to load options {}", path.display()))
}

pub fn execute(config: &mut Configuration, command: Command) -> Result<()> {
    match command {
        Command::Show => println!("{config}"),
        Command::Export => {
            let value = export(config)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Get { key } => {
            let settings = config.app_settings()?;
            match settings.get(&key) {
                Some(value) => println!("{value}"),
                None => bail!("no setting named {key:?}"),
            }
        }
        Command::Set { key, value } => {
            config.app_settings()?.insert(&key, value)?;
            println!("{} {key}", "set".green());
        }
        Command::Remove { key } => {
            if !config.app_settings()?.remove(&key)? {
                bail!("no setting named {key:?}");
            }
            println!("{} {key}", "removed".yellow());
        }
        Command::ConnSet {
            name,
            connection_string,
            provider,
        } => {
            config.connection_strings()?.add_or_update(
                &name,
                Some(&connection_string),
                provider.as_deref(),
            )?;
            println!("{} {name}", "set".green());
        }
        Command::ConnGet { name } => {
            let connections = config.connection_strings()?;
            let value = connections
                .get(&name)
                .with_context(|| format!("no connection string named {name:?}"))?;
            println!("{}", value.connection_string());
            match value.provider() {
                Ok(kind) => println!("{} {}", "provider:".bold(), kind.invariant_name()),
                Err(e) if value.provider_name().is_some() => {
                    println!("{} {e}", "provider:".bold().red())
                }
                Err(_) => {}
            }
        }
        Command::SectionSet {
            path,
            key,
            value,
            kind,
            type_tag,
        } => {
            let (groups, name) = split_path(&path)?;
            let registry = walk(config.config_sections()?, &groups, true)?;
            let section = registry.into_get_or_add(name, kind.into())?;
            match SectionKind::from(kind) {
                SectionKind::SingleTag => section.into_single_tag()?.insert(&key, value)?,
                SectionKind::NameValue => section.into_name_value()?.insert(&key, value)?,
                SectionKind::Dictionary => {
                    let typed = TypedValue::decode(&value, type_tag.as_deref())?;
                    section.into_dictionary()?.insert(&key, typed)?
                }
            }
            println!("{} {path}/{key}", "set".green());
        }
        Command::SectionShow { path } => {
            let (groups, name) = split_path(&path)?;
            let sections = config.config_sections()?;
            let registry = find(&sections, &groups)?;
            let section = registry
                .get(name)
                .with_context(|| format!("no section named {path:?}"))?;
            print_section(name, section);
        }
        Command::SectionRemove { path } => {
            let (groups, name) = split_path(&path)?;
            let mut registry = walk(config.config_sections()?, &groups, false)?;
            if !registry.remove(name)? {
                bail!("no section named {path:?}");
            }
            println!("{} {path}", "removed".yellow());
        }
        Command::CustomAdd {
            path,
            type_name,
            raw,
        } => {
            let (groups, name) = split_path(&path)?;
            let mut registry = walk(config.config_sections()?, &groups, true)?;
            registry.add_custom_section(name, &type_name, &raw)?;
            println!("{} {path}", "added".green());
        }
    }
    Ok(())
}

/// Splits `group/.../section` into its group names and section name.
fn split_path(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts: Vec<&str> = path.split('/').collect();
    match parts.pop() {
        Some(name) if !name.is_empty() && parts.iter().all(|p| !p.is_empty()) => {
            Ok((parts, name))
        }
        _ => bail!("invalid section path {path:?}"),
    }
}

/// Descends through `groups`, creating missing ones when `create` is set.
fn walk<'a>(
    sections: ConfigSectionsMut<'a>,
    groups: &[&str],
    create: bool,
) -> Result<SectionRegistryMut<'a>> {
    let Some((first, rest)) = groups.split_first() else {
        return Ok(sections.into_sections());
    };
    let mut group = enter(sections.into_groups(), first, create)?;
    for name in rest {
        group = enter(group.into_groups(), name, create)?;
    }
    Ok(group.into_sections())
}

fn enter<'a>(registry: GroupRegistryMut<'a>, name: &str, create: bool) -> Result<GroupMut<'a>> {
    if create {
        Ok(registry.into_get_or_add(name)?)
    } else {
        registry
            .into_group(name)
            .with_context(|| format!("no section group named {name:?}"))
    }
}

fn find<'a>(sections: &'a ConfigSections, groups: &[&str]) -> Result<&'a SectionRegistry> {
    let mut registry = sections.sections();
    let mut children = sections.groups();
    for name in groups {
        let group = children
            .get(name)
            .with_context(|| format!("no section group named {name:?}"))?;
        registry = group.sections();
        children = group.groups();
    }
    Ok(registry)
}

fn print_section(name: &str, section: &Section) {
    let label = match section.kind() {
        Some(kind) => kind.to_string(),
        None => section.type_name().to_string(),
    };
    println!("{} ({})", name.bold(), label.cyan());
    match section {
        Section::SingleTag(attrs) => {
            for (key, value) in attrs.iter() {
                println!("  {key} = {value}");
            }
        }
        Section::NameValue(props) => {
            for (key, value) in props.iter() {
                println!("  {key} = {value}");
            }
        }
        Section::Dictionary(props) => {
            for (key, value) in props.iter() {
                println!("  {key} = {value} {}", value.kind().tag().dimmed());
            }
        }
        Section::Custom(custom) => println!("{}", custom.raw()),
    }
}

/// Builds a JSON view of the whole document.
pub fn export(config: &mut Configuration) -> Result<Value> {
    let mut settings = Map::new();
    for (key, value) in config.app_settings()?.iter() {
        settings.insert(key.to_string(), json!(value));
    }

    let mut connections = Map::new();
    for (name, value) in config.connection_strings()?.iter() {
        connections.insert(
            name.to_string(),
            json!({
                "connectionString": value.connection_string(),
                "providerName": value.provider_name(),
            }),
        );
    }

    let sections = config.config_sections()?;
    Ok(json!({
        "appSettings": settings,
        "connectionStrings": connections,
        "configSections": registry_json(sections.sections(), sections.groups()),
    }))
}

fn registry_json(sections: &SectionRegistry, groups: &GroupRegistry) -> Value {
    let mut out = Map::new();
    for (name, section) in sections.iter() {
        out.insert(name.to_string(), section_json(section));
    }
    let mut nested = Map::new();
    for (name, group) in groups.iter() {
        nested.insert(
            name.to_string(),
            registry_json(group.sections(), group.groups()),
        );
    }
    json!({ "sections": out, "groups": nested })
}

fn section_json(section: &Section) -> Value {
    let values: Value = match section {
        Section::SingleTag(attrs) => attrs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect::<Map<_, _>>()
            .into(),
        Section::NameValue(props) => props
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect::<Map<_, _>>()
            .into(),
        Section::Dictionary(props) => props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect::<Map<_, _>>()
            .into(),
        Section::Custom(custom) => json!(custom.raw()),
    };
    json!({ "type": section.type_name(), "values": values })
}
