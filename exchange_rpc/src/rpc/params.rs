//! Unmarshaling of request parameters into typed values.

use {
    super::{error::BoxError, Error, Request},
    serde::de::DeserializeOwned,
    serde_json::value::RawValue,
};

/// Trait implemented by typed parameter values.
///
/// The [`validate`](Params::validate) hook runs after a successful decode;
/// the default accepts everything. Failures are wrapped as
/// invalid-parameters errors with the cause attached.
pub trait Params: DeserializeOwned {
    fn validate(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl Params for serde_json::Value {}

impl Params for () {}

/// Options controlling how request parameters are decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmarshalOptions {
    /// Accept parameter fields that the target type does not know about.
    /// The default is strict: an unknown field fails the decode.
    pub allow_unknown_fields: bool,
}

impl UnmarshalOptions {
    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.allow_unknown_fields = allow;
        self
    }
}

/// Decodes the request's parameters into a typed value.
///
/// Absent parameters decode as JSON `null`. Unless
/// [`allow_unknown_fields`](UnmarshalOptions::allow_unknown_fields) is set,
/// any field not consumed by the target type fails the decode. Every decode
/// or validation failure is reported as an invalid-parameters error.
pub fn unmarshal_params<P>(request: &Request, options: &UnmarshalOptions) -> Result<P, Error>
where
    P: Params,
{
    let fragment = request
        .params
        .as_deref()
        .map(RawValue::get)
        .unwrap_or("null");

    let mut deserializer = serde_json::Deserializer::from_str(fragment);

    let value: P = if options.allow_unknown_fields {
        P::deserialize(&mut deserializer).map_err(Error::invalid_parameters_cause)?
    } else {
        let mut unknown = None;

        let value = serde_ignored::deserialize(&mut deserializer, |path| {
            if unknown.is_none() {
                unknown = Some(path.to_string());
            }
        })
        .map_err(Error::invalid_parameters_cause)?;

        if let Some(field) = unknown {
            return Err(Error::invalid_parameters(format!(
                "parameters contain the unknown field {field:?}"
            )));
        }

        value
    };

    value.validate().map_err(Error::invalid_parameters_cause)?;

    Ok(value)
}
