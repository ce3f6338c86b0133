use approx::assert_abs_diff_eq;
use rand::prelude::*;
use rand_distr::Exp;
use rand_pcg::Pcg64;

use bighouse_stats::{Phase, StatName, Statistic, StatisticSettings};

const LAMBDA: f64 = 0.5;
const MAX_SAMPLES: usize = 10_000_000;

fn converge(stat: &mut Statistic, rand: &mut Pcg64) {
    let exp = Exp::new(LAMBDA).unwrap();
    let mut samples = 0;
    while !stat.is_converged() {
        stat.add_sample(exp.sample(rand));
        samples += 1;
        assert!(samples < MAX_SAMPLES, "statistic did not converge: {}", stat.summary());
    }
}

fn warmed(settings: StatisticSettings) -> Statistic {
    let mut stat = Statistic::new(StatName::SojournTime, settings);
    stat.set_other_stats_warmed(true);
    stat
}

fn assert_exponential_estimates(stat: &Statistic, tolerance: f64) {
    let mean = 1. / LAMBDA;
    assert_abs_diff_eq!(stat.average(), mean, epsilon = tolerance * mean);
    let p95 = -(1f64 - 0.95).ln() / LAMBDA;
    assert_abs_diff_eq!(stat.quantile(0.95), p95, epsilon = tolerance * p95);
    let cdf = 1. - (-LAMBDA * 2.).exp();
    assert_abs_diff_eq!(stat.cdf_value(2.), cdf, epsilon = tolerance * cdf);
}

#[test]
fn test_exponential_sampling() {
    let mut rand = Pcg64::seed_from_u64(123);
    let mut stat = warmed(StatisticSettings::new(10, 0.05, 0.95, 0.05));
    converge(&mut stat, &mut rand);

    assert!(stat.is_steady_state());
    assert!(stat.good_samples() >= 100);
    assert!(stat.mean_accuracy() < 0.05);
    assert!(stat.quantile_accuracy() < 0.05);
    assert_eq!(stat.discarded_warmup_samples(), 10);
    assert_eq!(stat.calibration_samples(), 5000);
    assert_exponential_estimates(&stat, 0.08);
}

#[test]
fn test_exponential_distributed_sampling() {
    let mut rand = Pcg64::seed_from_u64(456);
    let settings = StatisticSettings::new(10, 0.1, 0.95, 0.1);
    let mut first = warmed(settings.clone());
    converge(&mut first, &mut rand);

    let x_values = first.histogram_x_values().unwrap().to_vec();
    let mut others = Vec::new();
    for _ in 0..3 {
        let mut stat = Statistic::with_x_values(StatName::SojournTime, settings.clone(), &x_values);
        stat.set_other_stats_warmed(true);
        converge(&mut stat, &mut rand);
        others.push(stat);
    }

    let mut combined = first.combine(&others[0]);
    combined = combined.combine(&others[1]);
    combined = combined.combine(&others[2]);

    assert!(combined.is_combined());
    assert_eq!(combined.phase(), Phase::SteadyState);
    let good: u64 = first.good_samples() + others.iter().map(|s| s.good_samples()).sum::<u64>();
    let total: u64 = first.total_samples() + others.iter().map(|s| s.total_samples()).sum::<u64>();
    assert_eq!(combined.good_samples(), good);
    assert_eq!(combined.total_samples(), total);
    assert_eq!(combined.discarded_warmup_samples(), 10);
    assert_abs_diff_eq!(combined.histogram().unwrap().total(), good as f64);
    assert_exponential_estimates(&combined, 0.1);
}

#[test]
fn test_phases_and_accounting() {
    let mut rand = Pcg64::seed_from_u64(1);
    let mut settings = StatisticSettings::new(5, 0.05, 0.9, 0.05);
    settings.calibration_samples = 200;
    let mut stat = warmed(settings);

    for _ in 0..5 {
        stat.add_sample(rand.gen_range(0.0..1.0));
    }
    assert_eq!(stat.phase(), Phase::Warmup);
    assert_eq!(stat.discarded_warmup_samples(), 5);

    stat.add_sample(rand.gen_range(0.0..1.0));
    assert_eq!(stat.phase(), Phase::Calibration);
    for _ in 0..199 {
        stat.add_sample(rand.gen_range(0.0..1.0));
    }
    assert_eq!(stat.phase(), Phase::SteadyState);
    assert_eq!(stat.calibration_samples(), 200);
    assert!(stat.histogram().is_some());

    for _ in 0..1000 {
        stat.add_sample(rand.gen_range(0.0..1.0));
    }
    assert_eq!(stat.total_samples(), 1205);
    assert_eq!(
        stat.total_samples(),
        stat.good_samples()
            + stat.discarded_warmup_samples()
            + stat.discarded_steady_state_samples()
            + stat.calibration_samples()
    );
    let lag = stat.lag() as u64;
    let kept = (205..1205u64).filter(|t| t % lag == 0).count() as u64;
    assert_eq!(stat.good_samples(), kept);
}

#[test]
fn test_waits_for_other_stats() {
    let mut stat = Statistic::new(StatName::WaitTime, StatisticSettings::new(3, 0.05, 0.95, 0.05));
    for i in 0..10 {
        stat.add_sample(i as f64);
    }
    assert_eq!(stat.phase(), Phase::Warmup);
    assert_eq!(stat.discarded_warmup_samples(), 10);

    stat.set_other_stats_warmed(true);
    stat.add_sample(1.);
    assert_eq!(stat.phase(), Phase::Calibration);
    assert_eq!(stat.calibration_samples(), 1);
}

#[test]
fn test_just_bins() {
    let mut stat = warmed(StatisticSettings::new(0, 0.05, 0.95, 0.05));
    stat.set_just_bins(true);
    for i in 1..=100 {
        stat.add_sample(i as f64);
    }
    assert_eq!(stat.phase(), Phase::SteadyState);
    assert_eq!(stat.lag(), 1);
    let x_values = stat.histogram_x_values().unwrap();
    assert_eq!(x_values.len(), 10000);
    assert_abs_diff_eq!(x_values[x_values.len() - 1], 200., epsilon = 1e-6);
}

#[test]
fn test_constant_stream_converges() {
    let mut settings = StatisticSettings::new(0, 0.05, 0.95, 0.05);
    settings.calibration_samples = 200;
    let mut stat = warmed(settings);
    while !stat.is_converged() {
        stat.add_sample(3.);
        assert!(stat.total_samples() < 10_000);
    }
    assert_eq!(stat.good_samples(), 100);
    assert_abs_diff_eq!(stat.average(), 3.);
    assert_abs_diff_eq!(stat.quantile(0.95), 3., epsilon = 1e-3);
}

#[test]
fn test_combine_is_commutative() {
    let mut rand = Pcg64::seed_from_u64(7);
    let mut settings = StatisticSettings::new(0, 0.05, 0.95, 0.05);
    settings.calibration_samples = 500;
    let x_values: Vec<f64> = (1..=100).map(|i| i as f64 * 0.01).collect();
    let mut a = Statistic::with_x_values(StatName::SojournTime, settings.clone(), &x_values);
    let mut b = Statistic::with_x_values(StatName::SojournTime, settings, &x_values);
    a.set_other_stats_warmed(true);
    b.set_other_stats_warmed(true);
    for _ in 0..2000 {
        a.add_sample(rand.gen_range(0.0..1.0));
        b.add_sample(rand.gen_range(0.0..1.0));
    }
    let ab = a.combine(&b);
    let ba = b.combine(&a);
    assert_eq!(ab.good_samples(), ba.good_samples());
    assert_eq!(ab.total_samples(), ba.total_samples());
    assert_abs_diff_eq!(ab.simple_statistic().total_accumulation(), ba.simple_statistic().total_accumulation());
    assert_eq!(ab.histogram().unwrap().y_values(), ba.histogram().unwrap().y_values());
}

#[test]
#[should_panic(expected = "already includes")]
fn test_combine_with_itself() {
    let stat = Statistic::with_x_values(StatName::SojournTime, StatisticSettings::default(), &[1., 2., 3.]);
    stat.combine(&stat);
}

#[test]
#[should_panic(expected = "already includes")]
fn test_combine_twice() {
    let a = Statistic::with_x_values(StatName::SojournTime, StatisticSettings::default(), &[1., 2., 3.]);
    let b = Statistic::with_x_values(StatName::SojournTime, StatisticSettings::default(), &[1., 2., 3.]);
    let ab = a.combine(&b);
    ab.combine(&a);
}

#[test]
#[should_panic(expected = "different metrics")]
fn test_combine_different_metrics() {
    let a = Statistic::with_x_values(StatName::SojournTime, StatisticSettings::default(), &[1., 2., 3.]);
    let b = Statistic::with_x_values(StatName::WaitTime, StatisticSettings::default(), &[1., 2., 3.]);
    a.combine(&b);
}

#[test]
#[should_panic(expected = "after being combined")]
fn test_add_sample_after_combine() {
    let a = Statistic::with_x_values(StatName::SojournTime, StatisticSettings::default(), &[1., 2., 3.]);
    let b = Statistic::with_x_values(StatName::SojournTime, StatisticSettings::default(), &[1., 2., 3.]);
    let mut combined = a.combine(&b);
    combined.add_sample(1.);
}

#[test]
fn test_serialization() {
    let mut stat = warmed(StatisticSettings::new(2, 0.05, 0.95, 0.05));
    for i in 0..50 {
        stat.add_sample(i as f64);
    }
    let json = serde_json::to_string(&stat).unwrap();
    let restored: Statistic = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.total_samples(), stat.total_samples());
    assert_eq!(restored.phase(), stat.phase());
}
