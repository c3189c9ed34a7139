//! # Gibbs Chain
//!
//! One MCMC chain for the phylogenetic mixed model. All conditionals are
//! conjugate, so each step is a full Gibbs sweep:
//!
//! 1. `beta | u, sigma_e^2` — bivariate normal (intercept, opposite-vs-same)
//! 2. `u | beta, sigma_p^2, sigma_e^2` — multivariate normal, precision
//!    `Z'Z / sigma_e^2 + C^-1 / sigma_p^2`
//! 3. `sigma_p^2 | u` — inverse gamma
//! 4. `sigma_e^2 | beta, u` — inverse gamma
//!
//! The chain owns its RNG and draw state and borrows the immutable design
//! (`FitData`) shared by all chains of one fit.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma, StandardNormal};

use crate::model::parameters::ModelParams;

/// Variance draws are clamped into this range to keep the sweep finite even
/// when a conditional degenerates; a collapsed chain is then caught by the
/// adequacy check instead of poisoning the arithmetic.
const VAR_FLOOR: f64 = 1e-12;
const VAR_CEIL: f64 = 1e12;

/// Immutable per-fit design shared read-only across chains.
#[derive(Debug, Clone)]
pub struct FitData {
    /// Response on the log scale.
    pub y: DVector<f64>,
    /// n x 2 design: intercept column and the opposite-level indicator.
    pub x: DMatrix<f64>,
    /// Observation -> taxon row in the covariance matrix.
    pub taxon_of: Vec<usize>,
    /// Observations per taxon (the diagonal of Z'Z).
    pub counts: Vec<f64>,
    /// Inverse of the phylogenetic covariance matrix.
    pub c_inv: DMatrix<f64>,
    /// X'X, precomputed.
    pub xtx: DMatrix<f64>,
}

impl FitData {
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn n_taxa(&self) -> usize {
        self.counts.len()
    }
}

/// One recorded parameter state.
#[derive(Debug, Clone)]
pub struct GibbsTrace {
    pub intercept: f64,
    pub coef_opposite: f64,
    pub sigma_phylo: f64,
    pub sigma_resid: f64,
}

impl GibbsTrace {
    /// Monitored values in `PARAM_NAMES` order.
    pub fn trace(&self) -> Vec<f64> {
        vec![
            self.intercept,
            self.coef_opposite,
            self.sigma_phylo,
            self.sigma_resid,
        ]
    }
}

/// A single Gibbs chain over the shared fit design.
pub struct GibbsChain<'a> {
    rng: SmallRng,
    data: &'a FitData,
    params: &'a ModelParams,
    beta: DVector<f64>,
    u: DVector<f64>,
    sigma2_p: f64,
    sigma2_e: f64,
    trace: GibbsTrace,
}

impl<'a> GibbsChain<'a> {
    /// Create a chain seeded for reproducibility.
    ///
    /// Initialization: `beta` at the response mean with a zero effect, `u` at
    /// its prior mean, both variances at the response variance.
    pub fn new(seed: u64, data: &'a FitData, params: &'a ModelParams) -> Self {
        let n = data.n_obs() as f64;
        let mean_y = data.y.sum() / n;
        let var_y = data.y.iter().map(|v| (v - mean_y).powi(2)).sum::<f64>() / n;
        let var0 = var_y.max(1e-6);
        let beta = DVector::from_vec(vec![mean_y, 0.0]);
        let u = DVector::zeros(data.n_taxa());
        let trace = GibbsTrace {
            intercept: mean_y,
            coef_opposite: 0.0,
            sigma_phylo: var0.sqrt(),
            sigma_resid: var0.sqrt(),
        };
        Self {
            rng: SmallRng::seed_from_u64(seed),
            data,
            params,
            beta,
            u,
            sigma2_p: var0,
            sigma2_e: var0,
            trace,
        }
    }

    fn standard_normal_vec(&mut self, n: usize) -> DVector<f64> {
        DVector::from_fn(n, |_, _| StandardNormal.sample(&mut self.rng))
    }

    /// Draw from `N(mean, P^-1)` given the Cholesky factor of the precision
    /// `P = L L'`: the perturbation solves `L' v = z` by back substitution.
    fn perturb_from_precision(
        mean: DVector<f64>,
        chol: &Cholesky<f64, Dyn>,
        z: &DVector<f64>,
    ) -> DVector<f64> {
        let l = chol.l();
        let n = z.len();
        let mut v = DVector::zeros(n);
        for i in (0..n).rev() {
            let mut s = z[i];
            for j in (i + 1)..n {
                s -= l[(j, i)] * v[j];
            }
            v[i] = s / l[(i, i)];
        }
        mean + v
    }

    fn sample_inv_gamma(&mut self, shape: f64, rate: f64) -> f64 {
        // 1/g with g ~ Gamma(shape, scale = 1/rate) is Inv-Gamma(shape, rate).
        let draw = match Gamma::new(shape, 1.0 / rate) {
            Ok(dist) => {
                let g: f64 = dist.sample(&mut self.rng);
                1.0 / g
            }
            Err(_) => rate / shape,
        };
        draw.clamp(VAR_FLOOR, VAR_CEIL)
    }

    fn update_beta(&mut self) {
        let mut r = self.data.y.clone();
        for (i, &t) in self.data.taxon_of.iter().enumerate() {
            r[i] -= self.u[t];
        }
        let mut prec = &self.data.xtx / self.sigma2_e;
        for d in 0..prec.nrows() {
            prec[(d, d)] += 1.0 / self.params.beta_prior_var;
        }
        let rhs = self.data.x.transpose() * r / self.sigma2_e;
        if let Some(chol) = Cholesky::new(prec) {
            let mean = chol.solve(&rhs);
            let z = self.standard_normal_vec(self.beta.len());
            self.beta = Self::perturb_from_precision(mean, &chol, &z);
        }
    }

    fn update_u(&mut self) {
        let q = self.data.n_taxa();
        let xb = &self.data.x * &self.beta;
        let mut rhs = DVector::zeros(q);
        for (i, &t) in self.data.taxon_of.iter().enumerate() {
            rhs[t] += self.data.y[i] - xb[i];
        }
        rhs /= self.sigma2_e;
        let mut prec = &self.data.c_inv / self.sigma2_p;
        for j in 0..q {
            prec[(j, j)] += self.data.counts[j] / self.sigma2_e;
        }
        if let Some(chol) = Cholesky::new(prec) {
            let mean = chol.solve(&rhs);
            let z = self.standard_normal_vec(q);
            self.u = Self::perturb_from_precision(mean, &chol, &z);
        }
    }

    fn update_variances(&mut self) {
        let a = self.params.variance_prior_shape;
        let b = self.params.variance_prior_rate;
        let q = self.data.n_taxa() as f64;
        let n = self.data.n_obs() as f64;

        let quad = (&self.data.c_inv * &self.u).dot(&self.u);
        self.sigma2_p = self.sample_inv_gamma(a + q / 2.0, b + quad / 2.0);

        let xb = &self.data.x * &self.beta;
        let mut rss = 0.0;
        for (i, &t) in self.data.taxon_of.iter().enumerate() {
            let e = self.data.y[i] - xb[i] - self.u[t];
            rss += e * e;
        }
        self.sigma2_e = self.sample_inv_gamma(a + n / 2.0, b + rss / 2.0);
    }

    fn update_trace(&mut self) {
        self.trace = GibbsTrace {
            intercept: self.beta[0],
            coef_opposite: self.beta[1],
            sigma_phylo: self.sigma2_p.sqrt(),
            sigma_resid: self.sigma2_e.sqrt(),
        };
    }
}

impl GibbsChain<'_> {
    /// One full Gibbs sweep; returns the freshly recorded state.
    pub fn step(&mut self) -> &GibbsTrace {
        self.update_beta();
        self.update_u();
        self.update_variances();
        self.update_trace();
        &self.trace
    }

    /// The state recorded by the most recent sweep.
    pub fn current_state(&self) -> &GibbsTrace {
        &self.trace
    }
}
