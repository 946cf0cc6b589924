//! Configuration of a weave pass.
//!
//! [`WeaverConfig`] controls which assemblies the resolver may search, how the generated
//! interception code obtains the handle of the original method, which aspect kinds are
//! woven, the names of generated members and whether the output is verified.
//!
//! # Presets
//!
//! - [`WeaverConfig::default`] - Token lookup, verification on, every aspect kind
//! - [`WeaverConfig::compatibility`] - Per-call lookup by name, as older weavers emitted it
//! - [`WeaverConfig::strict`] - Default behavior, and the pass is reported as failed if
//!   verification finds any defect
//!
//! # XML
//!
//! Build hosts configure the weaver through the `DotNetAspects` element of a weavers
//! document:
//!
//! ```rust
//! use dotweave::config::{AspectKinds, OriginalMethodLookup, WeaverConfig};
//!
//! let config = WeaverConfig::from_xml(
//!     r#"<Weavers>
//!          <DotNetAspects OriginalLookup="ByName" Kinds="MethodInterception,MethodBoundary">
//!            <ScanAssembly Name="Contoso.Aspects"/>
//!          </DotNetAspects>
//!        </Weavers>"#,
//! )?;
//!
//! assert_eq!(config.original_lookup, OriginalMethodLookup::ByName);
//! assert!(!config.enabled.contains(AspectKinds::LOCATION_INTERCEPTION));
//! assert!(config.scan_assemblies.iter().any(|name| name == "Contoso.Aspects"));
//! # Ok::<(), dotweave::Error>(())
//! ```

use std::path::Path;

use bitflags::bitflags;
use quick_xml::{events::Event, Reader};

use crate::{Error, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Aspect kinds a pass weaves
    pub struct AspectKinds: u8 {
        /// Full call interception
        const METHOD_INTERCEPTION = 0x01;
        /// Entry/success/exception/exit wrapping
        const METHOD_BOUNDARY = 0x02;
        /// Property get/set interception
        const LOCATION_INTERCEPTION = 0x04;
    }
}

/// How interception code obtains the handle of the cloned original method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginalMethodLookup {
    /// Embed a direct handle to the clone, resolved at weave time
    #[default]
    Token,
    /// Look the clone up by name and binding flags on every call.
    ///
    /// Two clones with the same name on one type make the lookup ambiguous at runtime.
    ByName,
}

/// Name suffixes of the members a pass generates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneSuffixes {
    /// Clone of a fully intercepted method
    pub original: String,
    /// Clone of a boundary wrapped method
    pub boundary: String,
    /// Clone of an intercepted getter
    pub original_get: String,
    /// Clone of an intercepted setter
    pub original_set: String,
}

impl Default for CloneSuffixes {
    fn default() -> Self {
        CloneSuffixes {
            original: "$Original".to_string(),
            boundary: "$Boundary".to_string(),
            original_get: "$OriginalGet".to_string(),
            original_set: "$OriginalSet".to_string(),
        }
    }
}

impl CloneSuffixes {
    /// Suffix of the boxing adapter placed in front of an accessor clone
    pub const BOXED: &'static str = "Boxed";

    fn all(&self) -> [&str; 4] {
        [
            &self.original,
            &self.boundary,
            &self.original_get,
            &self.original_set,
        ]
    }
}

/// Configuration of a weave pass.
#[derive(Debug, Clone)]
pub struct WeaverConfig {
    /// Referenced assemblies the resolver may search, in search order
    pub scan_assemblies: Vec<String>,

    /// Handle lookup of the original method in interception code
    pub original_lookup: OriginalMethodLookup,

    /// Validate every touched body after the pass (default: true)
    pub verify_output: bool,

    /// Report verification defects as a failed pass instead of diagnostics only
    pub fail_on_verification_error: bool,

    /// Aspect kinds that are woven
    pub enabled: AspectKinds,

    /// Names of generated members
    pub suffixes: CloneSuffixes,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        WeaverConfig {
            scan_assemblies: [
                "DotNetAspects",
                "mscorlib",
                "System",
                "System.Runtime",
                "System.Reflection",
                "netstandard",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            original_lookup: OriginalMethodLookup::Token,
            verify_output: true,
            fail_on_verification_error: false,
            enabled: AspectKinds::all(),
            suffixes: CloneSuffixes::default(),
        }
    }
}

impl WeaverConfig {
    /// Emits the per-call name lookup of the original method
    #[must_use]
    pub fn compatibility() -> Self {
        WeaverConfig {
            original_lookup: OriginalMethodLookup::ByName,
            ..Self::default()
        }
    }

    /// Fails the pass if verification finds a defect
    #[must_use]
    pub fn strict() -> Self {
        WeaverConfig {
            verify_output: true,
            fail_on_verification_error: true,
            ..Self::default()
        }
    }

    /// True if `name` is the name of a member a pass generates
    #[must_use]
    pub fn is_generated_name(&self, name: &str) -> bool {
        self.suffixes.all().iter().any(|suffix| {
            name.ends_with(suffix)
                || name
                    .strip_suffix(CloneSuffixes::BOXED)
                    .is_some_and(|rest| rest.ends_with(suffix))
        })
    }

    /// Loads the configuration from a weavers document on disk
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or is not a valid document.
    pub fn from_file(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_xml(&xml)
    }

    /// Parses a weavers document.
    ///
    /// Without a `DotNetAspects` element the default configuration is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed XML, unknown attribute values and
    /// `ScanAssembly` elements without a name.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut in_section = false;
        let mut replace = false;
        let mut scanned = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| Error::Config(format!("position {}: {e}", reader.buffer_position())))?;

            match event {
                Event::Start(ref element) | Event::Empty(ref element) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match element.name().as_ref() {
                        b"DotNetAspects" => {
                            in_section = !is_empty;
                            for attribute in element.attributes() {
                                let attribute = attribute.map_err(|e| Error::Config(e.to_string()))?;
                                let value = attribute
                                    .unescape_value()
                                    .map_err(|e| Error::Config(e.to_string()))?;
                                match attribute.key.as_ref() {
                                    b"OriginalLookup" => {
                                        config.original_lookup = parse_lookup(&value)?;
                                    }
                                    b"VerifyOutput" => config.verify_output = parse_bool("VerifyOutput", &value)?,
                                    b"Strict" => {
                                        config.fail_on_verification_error = parse_bool("Strict", &value)?;
                                    }
                                    b"Kinds" => config.enabled = parse_kinds(&value)?,
                                    b"Replace" => replace = parse_bool("Replace", &value)?,
                                    other => {
                                        return Err(Error::Config(format!(
                                            "unknown attribute '{}'",
                                            String::from_utf8_lossy(other)
                                        )))
                                    }
                                }
                            }
                        }
                        b"ScanAssembly" if in_section => {
                            let mut name = None;
                            for attribute in element.attributes() {
                                let attribute = attribute.map_err(|e| Error::Config(e.to_string()))?;
                                if attribute.key.as_ref() == b"Name" {
                                    let value = attribute
                                        .unescape_value()
                                        .map_err(|e| Error::Config(e.to_string()))?;
                                    name = Some(value.trim().to_string());
                                }
                            }
                            match name {
                                Some(name) if !name.is_empty() => scanned.push(name),
                                _ => {
                                    return Err(Error::Config(
                                        "ScanAssembly requires a Name attribute".to_string(),
                                    ))
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(element) if element.name().as_ref() == b"DotNetAspects" => {
                    in_section = false;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if replace {
            config.scan_assemblies = scanned;
        } else {
            for name in scanned {
                if !config.scan_assemblies.contains(&name) {
                    config.scan_assemblies.push(name);
                }
            }
        }
        Ok(config)
    }
}

fn parse_bool(attribute: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "true" | "True" | "1" => Ok(true),
        "false" | "False" | "0" => Ok(false),
        other => Err(Error::Config(format!(
            "{attribute}: expected true or false, found '{other}'"
        ))),
    }
}

fn parse_lookup(value: &str) -> Result<OriginalMethodLookup> {
    match value.trim() {
        "Token" => Ok(OriginalMethodLookup::Token),
        "ByName" => Ok(OriginalMethodLookup::ByName),
        other => Err(Error::Config(format!(
            "OriginalLookup: expected Token or ByName, found '{other}'"
        ))),
    }
}

fn parse_kinds(value: &str) -> Result<AspectKinds> {
    let mut kinds = AspectKinds::empty();
    for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        kinds |= match part {
            "MethodInterception" => AspectKinds::METHOD_INTERCEPTION,
            "MethodBoundary" => AspectKinds::METHOD_BOUNDARY,
            "LocationInterception" => AspectKinds::LOCATION_INTERCEPTION,
            other => return Err(Error::Config(format!("Kinds: unknown aspect kind '{other}'"))),
        };
    }
    Ok(kinds)
}
