use egobox_gpc::{GaussianProcessClassifier, EGOBOX_LOG};
use env_logger::{Builder, Env};
use linfa::prelude::*;
use ndarray::{concatenate, Array, Array1, Array2, Axis, Zip};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn main() {
    let env = Env::new().filter_or(EGOBOX_LOG, "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    // two gaussian clusters centered on (-1.5, -1.5) labeled 0 and (1.5, 1.5) labeled 1
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let noise = Normal::new(0., 0.5).expect("normal distribution");
    let x0 = Array2::random_using((50, 2), noise, &mut rng) - 1.5;
    let x1 = Array2::random_using((50, 2), noise, &mut rng) + 1.5;
    let xtrain = concatenate![Axis(0), x0, x1];
    let ytrain = concatenate![Axis(0), Array1::<f64>::zeros(50), Array1::<f64>::ones(50)];

    let gpc = GaussianProcessClassifier::params()
        .fit(&Dataset::new(xtrain, ytrain))
        .expect("GPC fitting");
    println!("{gpc}");

    // probabilities along the diagonal going from one cluster to the other
    let t = Array::linspace(-3., 3., 13);
    let xtest = concatenate![Axis(1), t.view().insert_axis(Axis(1)), t.view().insert_axis(Axis(1))];
    let (mean, variance) = gpc.predict_params(&xtest).expect("GPC prediction");
    let probas = gpc.predict(&xtest).expect("GPC prediction");

    println!("{:>6} {:>6} {:>10} {:>10} {:>8}", "x1", "x2", "mean", "variance", "p(y=1)");
    Zip::from(xtest.rows())
        .and(&mean)
        .and(&variance)
        .and(&probas)
        .for_each(|x, m, v, p| {
            println!("{:>6.2} {:>6.2} {:>10.4} {:>10.4} {:>8.4}", x[0], x[1], m, v, p)
        });
}
