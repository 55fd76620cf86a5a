use rtrain_lib::optim::{
    ConjugateGradient, ConjugateGradientMethod, InverseHessianMethod, LineSearchMethod,
    QuasiNewtonMethod, StochasticGradientDescent, TrainingAlgorithm, TrainingMethod,
    TrainingStrategy,
};
use rtrain_lib::utils::serialization::{from_json, to_json};
use std::path::PathBuf;

#[test]
fn conjugate_gradient_thresholds_survive_json() {
    let mut cg = ConjugateGradient::new(ConjugateGradientMethod::FletcherReeves);
    cg.set_minimum_parameters_increment_norm(1.0e-9).unwrap();
    cg.set_minimum_loss_decrease(1.0e-12).unwrap();
    cg.set_loss_goal(1.0e-5).unwrap();
    cg.set_gradient_norm_goal(1.0e-7).unwrap();
    cg.set_maximum_selection_error_increases(17);
    cg.set_maximum_epochs_number(321);
    cg.set_maximum_time(12.5).unwrap();
    cg.set_error_gradient_norm(1.0e8).unwrap();
    cg.line_search.method = LineSearchMethod::GoldenSection;

    let text = to_json(&cg).unwrap();
    assert!(text.contains("\"training_direction_method\": \"FR\""));
    let restored: ConjugateGradient = from_json(&text).unwrap();

    assert_eq!(restored.training_direction_method, ConjugateGradientMethod::FletcherReeves);
    assert_eq!(restored.settings, cg.settings);
    assert_eq!(restored.line_search, cg.line_search);
    assert_eq!(restored.first_learning_rate, cg.first_learning_rate);
}

#[test]
fn default_loss_goal_survives_json() {
    let qn = QuasiNewtonMethod::new(InverseHessianMethod::Dfp);
    let restored: QuasiNewtonMethod = from_json(&to_json(&qn).unwrap()).unwrap();
    assert_eq!(restored.settings.loss_goal, f64::MIN);
    assert_eq!(restored.inverse_hessian_approximation_method, InverseHessianMethod::Dfp);
}

#[test]
fn stochastic_gradient_descent_survives_json() {
    let mut sgd = StochasticGradientDescent::new(0.05).unwrap().with_seed(99);
    sgd.set_momentum(0.9).unwrap();
    sgd.set_nesterov(true);
    sgd.set_initial_decay(1.0e-4).unwrap();
    sgd.set_batch_samples_number(32).unwrap();
    sgd.set_neural_network_file_name(Some(PathBuf::from("checkpoints/net.bin")));

    let restored: StochasticGradientDescent = from_json(&to_json(&sgd).unwrap()).unwrap();

    assert_eq!(restored.initial_learning_rate, 0.05);
    assert_eq!(restored.momentum, 0.9);
    assert!(restored.nesterov);
    assert_eq!(restored.initial_decay, 1.0e-4);
    assert_eq!(restored.batch_samples_number, 32);
    assert_eq!(restored.seed, Some(99));
    assert_eq!(restored.settings, sgd.settings);
}

#[test]
fn strategy_file_round_trip_keeps_every_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strategy.json");

    let mut strategy = TrainingStrategy::new(TrainingMethod::ConjugateGradient);
    strategy.conjugate_gradient.training_direction_method = ConjugateGradientMethod::FletcherReeves;
    strategy.quasi_newton_method.inverse_hessian_approximation_method = InverseHessianMethod::Dfp;
    strategy.stochastic_gradient_descent.set_momentum(0.5).unwrap();
    strategy.algorithm_mut().set_gradient_norm_goal(1.0e-3).unwrap();
    strategy.save(&path).unwrap();

    let loaded = TrainingStrategy::load(&path).unwrap();
    assert_eq!(loaded.training_method, TrainingMethod::ConjugateGradient);
    assert_eq!(loaded.conjugate_gradient.training_direction_method.name(), "FR");
    assert_eq!(loaded.quasi_newton_method.inverse_hessian_approximation_method.name(), "DFP");
    assert_eq!(loaded.stochastic_gradient_descent.momentum, 0.5);
    assert_eq!(loaded.conjugate_gradient.settings.gradient_norm_goal, 1.0e-3);
    assert_eq!(loaded.to_json().unwrap(), strategy.to_json().unwrap());
}

#[test]
fn strategy_document_uses_method_names() {
    let text = TrainingStrategy::new(TrainingMethod::StochasticGradientDescent)
        .to_json()
        .unwrap();
    assert!(text.contains("\"training_method\": \"STOCHASTIC_GRADIENT_DESCENT\""));
    assert!(text.contains("\"inverse_hessian_approximation_method\": \"BFGS\""));
    assert!(text.contains("\"training_direction_method\": \"PR\""));
}
