//! Storage scenarios, checked both through the solver and by hand

use esm_core::{Bus, EnergySystem, Flow, Investment, NodeIndex, Sink, Source, Storage};
use esm_model::blocks::{investment_storage, storage};
use esm_model::{build_model, FlowKey, Model, ModelConfig, TimeIndex};

struct Battery {
    es: EnergySystem,
    el: NodeIndex,
    battery: NodeIndex,
    grid: NodeIndex,
    sink: NodeIndex,
}

/// Battery charged with 10 at t0 and discharged with 10 at t1 into an
/// excess sink.
fn cycling_battery() -> Battery {
    let mut es = EnergySystem::new();
    let el = es.add_node(Bus::new("el")).unwrap();
    let grid = es.add_node(Source::new("grid")).unwrap();
    let sink = es.add_node(Sink::new("excess")).unwrap();
    let battery = es
        .add_node(
            Storage::new("battery")
                .with_nominal_capacity(100.0)
                .with_initial_capacity(0.5),
        )
        .unwrap();

    es.connect(grid, el, Flow::new().with_variable_costs(1.0)).unwrap();
    es.connect(el, sink, Flow::new()).unwrap();
    es.connect(
        el,
        battery,
        Flow::new().with_nominal_value(10.0).fixed_to(vec![1.0, 0.0]),
    )
    .unwrap();
    es.connect(
        battery,
        el,
        Flow::new().with_nominal_value(10.0).fixed_to(vec![0.0, 1.0]),
    )
    .unwrap();
    Battery {
        es,
        el,
        battery,
        grid,
        sink,
    }
}

fn build(es: &EnergySystem) -> Model {
    build_model(es, TimeIndex::uniform(2, 1.0).unwrap(), ModelConfig::default()).unwrap()
}

#[test]
fn test_hand_computed_trajectory_satisfies_model() {
    let b = cycling_battery();
    let model = build(&b.es);
    assert_eq!(model.family(storage::BALANCE).map(|f| f.len()), Some(2));

    let mut values = vec![0.0; model.num_variables()];
    let mut set = |var: Option<esm_model::VarId>, value: f64| {
        values[var.unwrap().index()] = value;
    };
    set(model.flow_var(FlowKey::new(b.grid, b.el), 0), 10.0);
    set(model.flow_var(FlowKey::new(b.el, b.battery), 0), 10.0);
    set(model.flow_var(FlowKey::new(b.battery, b.el), 1), 10.0);
    set(model.flow_var(FlowKey::new(b.el, b.sink), 1), 10.0);
    set(model.storage_capacity_var(b.battery, 0), 60.0);
    set(model.storage_capacity_var(b.battery, 1), 50.0);
    assert!(model.violations(&values, 1e-9).is_empty());

    // a trajectory that ignores the wrap-around is rejected
    values[model.storage_capacity_var(b.battery, 0).unwrap().index()] = 10.0;
    let violated = model.violations(&values, 1e-9);
    assert!(violated.iter().any(|(family, _, _)| *family == storage::BALANCE));
}

#[test]
fn test_solved_trajectory() {
    let b = cycling_battery();
    let model = build(&b.es);
    let outcome = esm_model::solve(&model).unwrap();
    assert!(outcome.status.is_success(), "{:?}", outcome.message);
    let results = outcome.results.unwrap();

    assert!((results.storage_capacity(b.battery, 0).unwrap() - 60.0).abs() < 1e-4);
    assert!((results.storage_capacity(b.battery, 1).unwrap() - 50.0).abs() < 1e-4);
    assert!((results.objective() - 10.0).abs() < 1e-3);
}

#[test]
fn test_losses_raise_grid_purchase() {
    let mut es = EnergySystem::new();
    let el = es.add_node(Bus::new("el")).unwrap();
    let grid = es.add_node(Source::new("grid")).unwrap();
    let demand = es.add_node(Sink::new("demand")).unwrap();
    let battery = es
        .add_node(
            Storage::new("battery")
                .with_nominal_capacity(100.0)
                .with_efficiencies(0.8, 1.0),
        )
        .unwrap();
    es.connect(
        grid,
        el,
        Flow::new()
            .with_nominal_value(10.0)
            .with_max(vec![1.0, 0.0])
            .with_variable_costs(1.0),
    )
    .unwrap();
    es.connect(el, demand, Flow::new().with_nominal_value(4.0).fixed_to(vec![0.0, 1.0]))
        .unwrap();
    es.connect(el, battery, Flow::new()).unwrap();
    es.connect(battery, el, Flow::new()).unwrap();

    let model = build(&es);
    let outcome = esm_model::solve(&model).unwrap();
    let results = outcome.results.unwrap();
    // 4 delivered at t1 needs 5 charged at t0
    assert!((results.flow(grid, el, 0).unwrap() - 5.0).abs() < 1e-3);
    assert!((results.objective() - 5.0).abs() < 1e-3);
}

#[test]
fn test_invested_storage_sizes_to_swing() {
    let mut es = EnergySystem::new();
    let el = es.add_node(Bus::new("el")).unwrap();
    let grid = es.add_node(Source::new("grid")).unwrap();
    let demand = es.add_node(Sink::new("demand")).unwrap();
    let battery = es
        .add_node(
            Storage::new("battery")
                .with_investment(Investment::new(1.0))
                .with_capacity_ratios(1.0, 1.0),
        )
        .unwrap();
    es.connect(
        grid,
        el,
        Flow::new()
            .with_nominal_value(10.0)
            .with_max(vec![1.0, 0.0])
            .with_variable_costs(0.1),
    )
    .unwrap();
    es.connect(el, demand, Flow::new().with_nominal_value(6.0).fixed_to(vec![0.0, 1.0]))
        .unwrap();
    es.connect(el, battery, Flow::new().with_investment(Investment::new(0.0)))
        .unwrap();
    es.connect(battery, el, Flow::new().with_investment(Investment::new(0.0)))
        .unwrap();

    let model = build(&es);
    assert_eq!(
        model
            .family(investment_storage::BALANCE)
            .map(|f| f.len()),
        Some(2)
    );
    assert!(model.family(investment_storage::MIN_CAPACITY).is_none());

    let outcome = esm_model::solve(&model).unwrap();
    let results = outcome.results.unwrap();
    let size = results.invest_storage(battery).unwrap();
    assert!((size - 6.0).abs() < 1e-3, "size {}", size);
    assert!((results.invest_flow(el, battery).unwrap() - size).abs() < 1e-3);
    // 6 of storage at 1 plus 6 of energy at 0.1
    assert!((results.objective() - 6.6).abs() < 1e-3);
}
