//! Ordering of the model definition phases.

use tracing::debug;

use crate::{
    ConfigError, Error, Growth, ModelDefinition, ModelDict, ModelSchema, ModelState, Phase,
    Settings, Value,
    dict::{AttrFilter, Restored, Slot},
    invariant::{check_assignment, check_value},
};

/// A value assigned on top of what setup produces.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Override {
    pub namespace: String,
    pub attribute: String,
    pub value: Value,
}

/// Saved data to reconstruct a model from.
pub(crate) struct Restore<'a> {
    pub dict: &'a ModelDict,
    pub skip: &'a AttrFilter,
    pub growth: Growth,
    /// Schema saved with the data; its extra attributes may be restored.
    pub recorded: Option<&'a ModelSchema>,
}

/// Collects and validates the model's settings.
pub(crate) fn declare<D: ModelDefinition>(definition: &mut D) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();
    definition.settings(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Runs setup and allocate, restoring saved data around them if given.
///
/// Fresh: setup, overrides, allocate.
///
/// Restored: setup, restored values of attributes setup created, overrides,
/// allocate, every restored value, overrides again. Attributes missing from
/// the saved data keep what setup and allocate computed.
pub(crate) fn initialize<D: ModelDefinition>(
    model: &str,
    definition: &mut D,
    settings: &Settings,
    restore: Option<Restore<'_>>,
    overrides: &[Override],
) -> Result<ModelState, Error> {
    let mut state = ModelState::from_settings(settings);

    debug!(model, phase = %Phase::Setup, "running model phase");
    definition
        .setup(&mut state)
        .map_err(|err| Error::definition(Phase::Setup, err))?;

    if let Some(restore) = &restore {
        let after_setup = ModelSchema::of(&state);
        let early = restore.dict.decode(&state, restore.skip, true)?;
        debug!(model, count = early.len(), "restoring parameters before allocate");
        apply_restored(&after_setup, &mut state, early, Growth::Forbidden)?;
    }

    apply_overrides(&mut state, overrides)?;

    debug!(model, phase = %Phase::Allocate, "running model phase");
    definition
        .allocate(&mut state)
        .map_err(|err| Error::definition(Phase::Allocate, err))?;

    if let Some(restore) = &restore {
        let allocated = ModelSchema::of(&state);
        let established = match restore.recorded {
            Some(recorded) => allocated.extended_with(recorded),
            None => allocated,
        };
        let restored = restore.dict.decode(&state, restore.skip, false)?;
        debug!(model, count = restored.len(), "restoring saved values");
        apply_restored(&established, &mut state, restored, restore.growth)?;
        apply_overrides(&mut state, overrides)?;
    }

    state.check_ambiguity()?;
    state.check_attribute_names()?;

    Ok(state)
}

/// Checks every restored value against `schema`, then assigns them all.
///
/// Nothing is assigned if any value fails the check.
pub(crate) fn apply_restored(
    schema: &ModelSchema,
    state: &mut ModelState,
    restored: Vec<Restored>,
    growth: Growth,
) -> Result<(), Error> {
    for item in &restored {
        if let Slot::Namespace(namespace) = &item.slot {
            check_assignment(schema, namespace, &item.attribute, &item.value, growth)?;
        }
    }

    for item in restored {
        item.apply(state);
    }

    Ok(())
}

/// Assigns each override to an attribute that exists with the same type.
pub(crate) fn apply_overrides(state: &mut ModelState, overrides: &[Override]) -> Result<(), Error> {
    for Override {
        namespace,
        attribute,
        value,
    } in overrides
    {
        let ns = state
            .namespace_mut(namespace)
            .ok_or_else(|| ConfigError::UnknownNamespace(namespace.clone()))?;

        let current = ns
            .get(attribute)
            .ok_or_else(|| ConfigError::UnknownAttribute {
                namespace: namespace.clone(),
                attribute: attribute.clone(),
            })?;
        check_value(namespace, attribute, &current.field_type(), value)?;

        ns.set(attribute.as_str(), value.clone());
    }

    Ok(())
}
