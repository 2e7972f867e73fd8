use std::panic::{self, AssertUnwindSafe};

use approx::assert_relative_eq;
use econ_model_core::{EconModel, Error, JitError, JitField, JitScope};
use integration_tests::ConsumptionSaving;

#[test]
fn mutation_persists_after_scope() -> Result<(), Error> {
    let mut model = EconModel::new("baseline", ConsumptionSaving::default())?;

    model
        .jit(|scope| {
            let beta = scope.record("par").and_then(|par| par.float("beta")).unwrap();
            let sol = scope.record_mut("sol").unwrap();
            sol.float_array_mut("c").unwrap().fill(beta);
            *scope.record_mut("sim").unwrap().int_mut("seed").unwrap() = 7;
        })
        .unwrap();

    assert_relative_eq!(model.sol().float_array("c").unwrap().sum(), 0.96 * 50.0);
    assert_eq!(model.sim().int("seed"), Some(7));
    model.check_types()?;
    Ok(())
}

#[test]
fn records_mirror_namespace_order() -> Result<(), Error> {
    let mut model = EconModel::new("baseline", ConsumptionSaving::default())?;

    let scope = JitScope::enter_only(&mut model, &["par"]).unwrap();
    let par = scope.record("par").unwrap();

    assert_eq!(
        par.layout()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>(),
        ["beta", "rho", "Na", "a_max", "T", "grid_a"]
    );
    assert_eq!(par.layout()[2].1, JitField::Int);
    assert_eq!(par.layout()[5].1, JitField::FloatArray { ndim: 1 });
    assert!(scope.record("sol").is_none());
    Ok(())
}

#[test]
fn error_inside_scope_leaves_model_usable() -> Result<(), Error> {
    let mut model = EconModel::new("baseline", ConsumptionSaving::default())?;

    let result: Result<(), &str> = model
        .jit(|scope| {
            scope
                .record_mut("sol")
                .and_then(|sol| sol.float_array_mut("v"))
                .unwrap()
                .fill(1.0);
            Err("did not converge")
        })
        .unwrap();
    assert_eq!(result, Err("did not converge"));

    assert_relative_eq!(model.sol().float_array("v").unwrap().sum(), 50.0);
    model.check_types()?;
    let copy = model.copy()?;
    assert_eq!(copy.state(), model.state());
    Ok(())
}

#[test]
fn panic_inside_scope_still_restores_namespaces() -> Result<(), Error> {
    let mut model = EconModel::new("baseline", ConsumptionSaving::default())?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), JitError> = model.jit(|scope| {
            *scope.record_mut("par").unwrap().float_mut("beta").unwrap() = 0.5;
            panic!("solver blew up");
        });
    }));
    assert!(outcome.is_err());

    assert_eq!(model.par().len(), 6);
    assert_relative_eq!(model.par().float("beta").unwrap(), 0.5);
    model.check_types()?;
    Ok(())
}

#[test]
fn text_attributes_cannot_enter_a_scope() -> Result<(), Error> {
    let mut model = EconModel::new("egm", ConsumptionSaving::with_method("egm"))?;
    let before = model.as_dict();

    let err = JitScope::enter(&mut model).unwrap_err();

    let JitError::Unsupported(unsupported) = err else {
        panic!("expected an unsupported type error");
    };
    assert_eq!(unsupported.namespace, "par");
    assert_eq!(unsupported.attribute, "method");
    assert_eq!(model.as_dict(), before);

    // Namespaces without text are still reachable.
    let scope = JitScope::enter_only(&mut model, &["sol", "sim"]).unwrap();
    assert_eq!(scope.records().len(), 2);
    Ok(())
}

#[test]
fn structural_drift_blocks_the_scope() -> Result<(), Error> {
    let mut model = EconModel::new("baseline", ConsumptionSaving::default())?;
    model.sim_mut().set("seed", 1.5);

    let err = model.jit(|_| ()).unwrap_err();

    assert!(matches!(err, JitError::Structural(ref e) if e.attribute() == Some("seed")));
    Ok(())
}
