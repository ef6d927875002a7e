use std::{cell::RefCell, rc::Rc};

use confman::{Configuration, Options, PropertyMap, Result, SectionKind, Storage};

/// In-memory storage recording every store call.
#[derive(Clone, Default)]
struct Recorder {
    initial: Option<String>,
    stored: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.stored.borrow().len()
    }

    fn last(&self) -> Option<String> {
        self.stored.borrow().last().cloned()
    }
}

impl Storage for Recorder {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.initial.clone())
    }

    fn store(&mut self, xml: &str) -> Result<()> {
        self.stored.borrow_mut().push(xml.to_string());
        Ok(())
    }
}

fn open(recorder: &Recorder, auto_save: bool) -> Configuration {
    let _ = env_logger::builder().is_test(true).try_init();
    let options = Options {
        auto_save,
        ..Options::default()
    };
    Configuration::with_storage(recorder.clone(), &options).unwrap()
}

#[test]
fn test_each_mutation_stores_once() {
    let recorder = Recorder::default();
    let mut config = open(&recorder, true);

    config.app_settings().unwrap().insert("a", "1").unwrap();
    assert_eq!(recorder.count(), 1);

    config.app_settings().unwrap().insert("a", "2").unwrap();
    assert_eq!(recorder.count(), 2);

    assert!(config.app_settings().unwrap().remove("a").unwrap());
    assert_eq!(recorder.count(), 3);

    // nothing to remove, nothing stored
    assert!(!config.app_settings().unwrap().remove("a").unwrap());
    config.app_settings().unwrap().set("a", None).unwrap();
    assert_eq!(recorder.count(), 3);

    config
        .connection_strings()
        .unwrap()
        .add_or_update("db", Some("Data Source=x"), Some("Npgsql"))
        .unwrap();
    assert_eq!(recorder.count(), 4);

    let mut sections = config.config_sections().unwrap();
    sections
        .sections_mut()
        .get_or_add("s", SectionKind::NameValue)
        .unwrap();
    assert_eq!(recorder.count(), 5);

    // existing section, no store
    sections
        .sections_mut()
        .get_or_add("s", SectionKind::NameValue)
        .unwrap();
    assert_eq!(recorder.count(), 5);

    sections
        .sections_mut()
        .get_or_add_name_value("s")
        .unwrap()
        .add_or_merge("k", "v")
        .unwrap();
    assert_eq!(recorder.count(), 6);

    sections.groups_mut().get_or_add("g").unwrap();
    assert_eq!(recorder.count(), 7);

    sections
        .sections_mut()
        .add_custom_section("c", "MyType", "<x>1</x>")
        .unwrap();
    assert_eq!(recorder.count(), 8);

    assert!(sections.sections_mut().remove("c").unwrap());
    assert_eq!(recorder.count(), 9);

    sections.groups_mut().clear().unwrap();
    assert_eq!(recorder.count(), 10);

    let last = recorder.last().unwrap();
    assert!(last.starts_with("<?xml"));
    assert!(last.contains(r#"<add key="k" value="v" />"#));
}

#[test]
fn test_disabled_auto_save_waits_for_save() {
    let recorder = Recorder::default();
    let mut config = open(&recorder, false);

    config.app_settings().unwrap().insert("a", "1").unwrap();
    config
        .config_sections()
        .unwrap()
        .sections_mut()
        .get_or_add_single_tag("tag")
        .unwrap()
        .insert("x", "y")
        .unwrap();
    assert_eq!(recorder.count(), 0);

    config.save().unwrap();
    assert_eq!(recorder.count(), 1);

    config.set_auto_save(true);
    config.app_settings().unwrap().insert("b", "2").unwrap();
    assert_eq!(recorder.count(), 2);
}

#[test]
fn test_failed_mutation_does_not_store() {
    let recorder = Recorder::default();
    let mut config = open(&recorder, true);

    let mut sections = config.config_sections().unwrap();
    assert!(
        sections
            .sections_mut()
            .get_or_add("bad name", SectionKind::Dictionary)
            .is_err()
    );
    assert!(sections.groups_mut().get_or_add("also bad").is_err());
    assert!(config.app_settings().unwrap().insert("", "v").is_err());
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_loads_initial_document() {
    let recorder = Recorder {
        initial: Some(
            r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <appSettings>
    <add key="loaded" value="yes" />
  </appSettings>
</configuration>"#
                .to_string(),
        ),
        ..Recorder::default()
    };
    let mut config = open(&recorder, true);
    assert_eq!(
        config.app_settings().unwrap().get("loaded").map(String::as_str),
        Some("yes")
    );
    assert_eq!(recorder.count(), 0);
}
