//! Typed option registry shared by integrators and steppers.
//!
//! An object registers the options it understands with [`Options::add_option`];
//! anything else passed to [`Options::set_option`] is rejected. Values are
//! kept in a [`Dictionary`] so that a whole set of options can be forwarded
//! verbatim, e.g. to the integrator built for an augmented problem.

use std::{collections::BTreeMap, fmt, io};

use crate::{Float, error::{Error, Result}};

/// Name-ordered option values.
pub type Dictionary = BTreeMap<String, OptionValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Boolean,
    Integer,
    Real,
    String,
    Dictionary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Real(Float),
    Str(String),
    Dict(Dictionary),
}

impl OptionValue {
    pub fn option_type(&self) -> OptionType {
        match self {
            OptionValue::Bool(_) => OptionType::Boolean,
            OptionValue::Int(_) => OptionType::Integer,
            OptionValue::Real(_) => OptionType::Real,
            OptionValue::Str(_) => OptionType::String,
            OptionValue::Dict(_) => OptionType::Dictionary,
        }
    }

    /// Convert to `ty`, promoting integers to reals.
    fn coerce(self, ty: OptionType) -> Option<OptionValue> {
        match (self, ty) {
            (OptionValue::Int(i), OptionType::Real) => Some(OptionValue::Real(i as Float)),
            (v, ty) if v.option_type() == ty => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{}", v),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Real(v) => write!(f, "{}", v),
            OptionValue::Str(v) => write!(f, "\"{}\"", v),
            OptionValue::Dict(d) => {
                write!(f, "{{")?;
                for (i, (k, v)) in d.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<Float> for OptionValue {
    fn from(v: Float) -> Self {
        OptionValue::Real(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<Dictionary> for OptionValue {
    fn from(v: Dictionary) -> Self {
        OptionValue::Dict(v)
    }
}

#[derive(Debug, Clone)]
struct Allowed {
    ty: OptionType,
    description: String,
}

/// Registry of allowed options and their current values.
#[derive(Debug, Clone, Default)]
pub struct Options {
    allowed: BTreeMap<String, Allowed>,
    values: Dictionary,
}

impl Options {
    pub fn new() -> Self {
        let mut options = Self::default();
        options.add_option("name", OptionType::String, Some("unnamed_shared_object".into()), "name of the object");
        options
    }

    /// Register an option. A `Some` default counts as set.
    pub fn add_option(&mut self, name: &str, ty: OptionType, default: Option<OptionValue>, description: &str) {
        self.allowed.insert(
            name.to_string(),
            Allowed {
                ty,
                description: description.to_string(),
            },
        );
        if let Some(v) = default {
            self.values.insert(name.to_string(), v);
        }
    }

    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<()> {
        let allowed = self
            .allowed
            .get(name)
            .ok_or_else(|| Error::UnknownOption(name.to_string()))?;
        let value = value.into().coerce(allowed.ty).ok_or_else(|| Error::OptionType {
            name: name.to_string(),
            expected: allowed.ty,
        })?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Set every entry of a dictionary; stops at the first rejected entry.
    pub fn set_options(&mut self, dict: &Dictionary) -> Result<()> {
        dict.iter().try_for_each(|(k, v)| self.set_option(k, v.clone()))
    }

    pub fn get_option(&self, name: &str) -> Result<&OptionValue> {
        if !self.has_option(name) {
            return Err(Error::UnknownOption(name.to_string()));
        }
        self.values.get(name).ok_or_else(|| Error::OptionNotSet(name.to_string()))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.get_option(name)? {
            OptionValue::Bool(v) => Ok(*v),
            _ => Err(self.type_error(name)),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.get_option(name)? {
            OptionValue::Int(v) => Ok(*v),
            _ => Err(self.type_error(name)),
        }
    }

    pub fn get_real(&self, name: &str) -> Result<Float> {
        match self.get_option(name)? {
            OptionValue::Real(v) => Ok(*v),
            OptionValue::Int(v) => Ok(*v as Float),
            _ => Err(self.type_error(name)),
        }
    }

    pub fn get_dict(&self, name: &str) -> Result<&Dictionary> {
        match self.get_option(name)? {
            OptionValue::Dict(v) => Ok(v),
            _ => Err(self.type_error(name)),
        }
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.allowed.contains_key(name)
    }

    pub fn has_set_option(&self, name: &str) -> Result<bool> {
        if !self.has_option(name) {
            return Err(Error::UnknownOption(name.to_string()));
        }
        Ok(self.values.contains_key(name))
    }

    /// All values currently set, defaults included.
    pub fn dictionary(&self) -> &Dictionary {
        &self.values
    }

    pub fn print_options(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "\"Option name\" [type] = value")?;
        for (name, allowed) in &self.allowed {
            write!(out, "  \"{}\" [{:?}] ", name, allowed.ty)?;
            match self.values.get(name) {
                Some(v) => write!(out, "= {}", v)?,
                None => write!(out, "(not set)")?,
            }
            writeln!(out, "  {}", allowed.description)?;
        }
        writeln!(out)
    }

    fn type_error(&self, name: &str) -> Error {
        Error::OptionType {
            name: name.to_string(),
            expected: self.allowed[name].ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_mistyped_options_are_rejected() {
        let mut opts = Options::new();
        opts.add_option("tf", OptionType::Real, Some(1.0.into()), "end time");
        assert!(matches!(opts.set_option("tend", 2.0), Err(Error::UnknownOption(_))));
        assert!(matches!(opts.set_option("tf", true), Err(Error::OptionType { .. })));
        opts.set_option("tf", 3_i64).unwrap();
        assert_eq!(opts.get_real("tf").unwrap(), 3.0);
    }

    #[test]
    fn has_set_option_distinguishes_unset_defaults() {
        let mut opts = Options::new();
        opts.add_option("augmented_options", OptionType::Dictionary, None, "forwarded options");
        assert!(!opts.has_set_option("augmented_options").unwrap());
        assert!(matches!(opts.get_option("augmented_options"), Err(Error::OptionNotSet(_))));
        opts.set_option("augmented_options", Dictionary::new()).unwrap();
        assert!(opts.has_set_option("augmented_options").unwrap());
        assert!(opts.has_set_option("nope").is_err());
    }

    #[test]
    fn print_lists_every_registered_option() {
        let mut opts = Options::new();
        opts.add_option("print_stats", OptionType::Boolean, Some(false.into()), "print statistics");
        let mut buf = Vec::new();
        opts.print_options(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"print_stats\" [Boolean] = false"));
        assert!(text.contains("\"name\""));
    }
}
