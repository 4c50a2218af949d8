//! End-to-end tests solving small models through the library API.
use float_cmp::assert_approx_eq;
use pvkkt::diagnostics::Diagnostics;
use pvkkt::formulation::Formulation;
use pvkkt::model::{EncodingKind, FormulationOptions, Model, ObjectiveKind, ParameterSet};
use pvkkt::series::TimeSeries;
use pvkkt::solution::{Solution, solve};
use pvkkt::solver::oracle_for;
use pvkkt::units::{Energy, MoneyPerCapacity, MoneyPerEnergy, Year};
use rstest::rstest;

const TOLERANCE: f64 = 1e-5;

/// Inputs of the three-period household used throughout
fn parameters(price_pv: f64, price_battery: f64) -> ParameterSet {
    ParameterSet {
        lifetime: Year(10.0),
        price_pv: MoneyPerCapacity(price_pv),
        price_battery: MoneyPerCapacity(price_battery),
        cost_buy: MoneyPerEnergy(0.25),
        sell_price: MoneyPerEnergy(0.05),
        demand_total: Energy(10.0),
    }
}

fn build_model(
    parameters: ParameterSet,
    encoding: EncodingKind,
    pv_availability: Vec<f64>,
    demand: Vec<f64>,
) -> Model {
    let series = TimeSeries::new(pv_availability, demand).unwrap();
    let options = FormulationOptions {
        encoding,
        ..FormulationOptions::default()
    };
    Model::new(parameters, options, series).unwrap()
}

fn solve_model(model: &Model) -> (Formulation, Solution) {
    let formulation = Formulation::build(model).unwrap();
    let solution = solve(&formulation, oracle_for(&model.options).as_ref()).unwrap();
    (formulation, solution)
}

/// Check the solution is a KKT point: balances, strong duality and complementary slackness
fn assert_kkt_point(formulation: &Formulation, solution: &Solution) {
    let diagnostics = Diagnostics::evaluate(formulation, solution, TOLERANCE);
    assert!(diagnostics.balances_hold(), "{diagnostics:?}");
    assert!(diagnostics.strong_duality_holds(), "{diagnostics:?}");
    assert!(
        diagnostics.violated_families().next().is_none(),
        "{diagnostics:?}"
    );
}

#[test]
fn test_expensive_installation_buys_from_grid() {
    let model = build_model(
        parameters(1000.0, 300.0),
        EncodingKind::BigM,
        vec![0.0, 1.0, 0.5],
        vec![1.0, 0.0, 1.0],
    );
    let (formulation, solution) = solve_model(&model);

    assert_approx_eq!(f64, solution.objective(), 5.0, epsilon = TOLERANCE);
    assert_approx_eq!(f64, solution.capacity_pv().value(), 0.0, epsilon = TOLERANCE);
    assert_approx_eq!(
        f64,
        solution.capacity_battery().value(),
        0.0,
        epsilon = TOLERANCE
    );

    let diagnostics = Diagnostics::evaluate(&formulation, &solution, 1e-6);
    assert!(diagnostics.all_hold(), "{diagnostics:?}");
}

#[test]
fn test_zero_availability_builds_no_pv() {
    let model = build_model(
        parameters(1.0, 300.0),
        EncodingKind::BigM,
        vec![0.0, 0.0, 0.0],
        vec![1.0, 0.0, 1.0],
    );
    let (_, solution) = solve_model(&model);

    assert_approx_eq!(f64, solution.capacity_pv().value(), 0.0, epsilon = TOLERANCE);
    for value in solution.series("energy_PV").unwrap() {
        assert_approx_eq!(f64, *value, 0.0, epsilon = TOLERANCE);
    }
    assert_approx_eq!(f64, solution.objective(), 5.0, epsilon = TOLERANCE);
}

#[test]
fn test_length_mismatch_rejected() {
    assert!(TimeSeries::new(vec![0.0, 1.0, 0.5], vec![1.0, 0.0, 1.0, 1.0]).is_err());
}

#[test]
fn test_negative_demand_sold_to_grid() {
    let model = build_model(
        parameters(1000.0, 300.0),
        EncodingKind::BigM,
        vec![0.0, 1.0, 0.5],
        vec![1.0, -1.0, 1.0],
    );
    let (_, solution) = solve_model(&model);

    // Two periods bought at 0.25, surplus of 10 sold at 0.05
    assert_approx_eq!(f64, solution.objective(), 4.5, epsilon = TOLERANCE);
    assert_approx_eq!(
        f64,
        solution.series("energy_sell").unwrap()[1],
        10.0,
        epsilon = TOLERANCE
    );
}

#[rstest]
#[case(EncodingKind::BigM)]
#[case(EncodingKind::Nonlinear)]
fn test_cheap_pv(#[case] encoding: EncodingKind) {
    let model = build_model(
        parameters(1.0, 300.0),
        encoding,
        vec![0.0, 1.0, 0.5],
        vec![1.0, 0.0, 1.0],
    );
    let (formulation, solution) = solve_model(&model);

    assert_approx_eq!(f64, solution.objective(), 3.5, epsilon = TOLERANCE);
    assert_approx_eq!(f64, solution.capacity_pv().value(), 20.0, epsilon = 1e-4);
    assert_kkt_point(&formulation, &solution);
}

#[rstest]
#[case(EncodingKind::BigM)]
#[case(EncodingKind::Nonlinear)]
fn test_cheap_battery_shifts_pv(#[case] encoding: EncodingKind) {
    // Battery at 0.04 per unit: period 1 PV is stored for periods 2 and 0
    let model = build_model(
        parameters(1.0, 0.4),
        encoding,
        vec![0.0, 1.0, 0.5],
        vec![1.0, 0.0, 1.0],
    );
    let (formulation, solution) = solve_model(&model);

    // 40/3 of PV and of battery, with nothing bought or sold
    assert_approx_eq!(f64, solution.objective(), 5.6 / 3.0, epsilon = TOLERANCE);
    assert_approx_eq!(
        f64,
        solution.capacity_pv().value(),
        40.0 / 3.0,
        epsilon = 1e-4
    );
    assert_approx_eq!(
        f64,
        solution.capacity_battery().value(),
        40.0 / 3.0,
        epsilon = 1e-4
    );

    // All of period 0's demand comes out of the battery
    let discharge = solution.series("energy_battery_out").unwrap();
    let charge = solution.series("energy_battery_in").unwrap();
    assert_approx_eq!(f64, discharge[0] - charge[0], 10.0, epsilon = 1e-4);
    assert!(discharge.iter().any(|out| *out > 1.0));
    for bought in solution.series("energy_buy").unwrap() {
        assert_approx_eq!(f64, *bought, 0.0, epsilon = 1e-4);
    }
    assert_kkt_point(&formulation, &solution);
}

#[rstest]
#[case(1000.0, 300.0)]
#[case(1.0, 300.0)]
#[case(1.0, 1.0)]
#[case(0.8, 0.5)]
fn test_big_m_matches_nonlinear(#[case] price_pv: f64, #[case] price_battery: f64) {
    let solve_with = |encoding| {
        let model = build_model(
            parameters(price_pv, price_battery),
            encoding,
            vec![0.0, 1.0, 0.5],
            vec![1.0, 0.0, 1.0],
        );
        let (formulation, solution) = solve_model(&model);
        assert_kkt_point(&formulation, &solution);
        solution.objective()
    };

    assert_approx_eq!(
        f64,
        solve_with(EncodingKind::BigM),
        solve_with(EncodingKind::Nonlinear),
        epsilon = TOLERANCE
    );
}

#[rstest]
#[case(1000.0, 300.0)]
#[case(1.0, 1.0)]
fn test_strong_duality(#[case] price_pv: f64, #[case] price_battery: f64) {
    let model = build_model(
        parameters(price_pv, price_battery),
        EncodingKind::BigM,
        vec![0.0, 1.0, 0.5],
        vec![1.0, 0.0, 1.0],
    );
    let mut formulation = Formulation::build(&model).unwrap();
    let oracle = oracle_for(&model.options);
    let primal = solve(&formulation, oracle.as_ref()).unwrap();

    formulation.set_active_objective(ObjectiveKind::Dual).unwrap();
    let dual = solve(&formulation, oracle.as_ref()).unwrap();

    assert_eq!(dual.objective_kind(), ObjectiveKind::Dual);
    assert_approx_eq!(f64, primal.objective(), dual.objective(), epsilon = TOLERANCE);

    let diagnostics = Diagnostics::evaluate(&formulation, &dual, 1e-6);
    assert!(diagnostics.strong_duality_holds(), "{diagnostics:?}");
}

#[test]
fn test_resolve_after_demand_perturbation() {
    let model = build_model(
        parameters(1000.0, 300.0),
        EncodingKind::BigM,
        vec![0.0, 1.0, 0.5],
        vec![1.0, 0.0, 1.0],
    );
    let mut formulation = Formulation::build(&model).unwrap();
    let oracle = oracle_for(&model.options);
    assert_approx_eq!(
        f64,
        solve(&formulation, oracle.as_ref()).unwrap().objective(),
        5.0,
        epsilon = TOLERANCE
    );

    // Five more units are bought in period 1
    formulation.set_demand_perturbation([(1, 0.5)]).unwrap();
    let solution = solve(&formulation, oracle.as_ref()).unwrap();
    assert_approx_eq!(f64, solution.objective(), 6.25, epsilon = TOLERANCE);
    assert_approx_eq!(
        f64,
        solution.series("energy_buy").unwrap()[1],
        5.0,
        epsilon = TOLERANCE
    );
}

#[rstest]
#[case(EncodingKind::BigM)]
#[case(EncodingKind::Nonlinear)]
fn test_single_period(#[case] encoding: EncodingKind) {
    let model = build_model(parameters(1.0, 300.0), encoding, vec![1.0], vec![1.0]);
    let (formulation, solution) = solve_model(&model);

    // PV at 0.1 per unit beats buying at 0.25
    assert_approx_eq!(f64, solution.capacity_pv().value(), 10.0, epsilon = 1e-4);
    assert_approx_eq!(f64, solution.objective(), 1.0, epsilon = TOLERANCE);

    let diagnostics = Diagnostics::evaluate(&formulation, &solution, 1e-6);
    assert!(diagnostics.balances_hold(), "{diagnostics:?}");
}
