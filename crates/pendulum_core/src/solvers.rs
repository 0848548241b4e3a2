use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let two = T::one() + T::one();
        let half = T::one() / two;
        let sixth = T::one() / (two + two + two);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

#[cfg(test)]
mod tests {
    use super::RK4;
    use crate::traits::{DynamicalSystem, Steppable};
    use approx::assert_abs_diff_eq;

    struct ConstantRate {
        rates: Vec<f64>,
    }

    impl DynamicalSystem<f64> for ConstantRate {
        fn dimension(&self) -> usize {
            self.rates.len()
        }

        fn apply(&self, _t: f64, _x: &[f64], out: &mut [f64]) {
            out.copy_from_slice(&self.rates);
        }
    }

    struct Decay;

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -x[0];
        }
    }

    #[test]
    fn constant_rate_advances_by_dt_times_rate() {
        let system = ConstantRate {
            rates: vec![1.0, -2.5, 0.0, 7.0],
        };
        let mut stepper = RK4::new(system.dimension());
        let mut state = vec![0.0, 1.0, 3.0, -4.0];
        let start = state.clone();
        let mut t = 0.0;
        let dt = 0.125;

        stepper.step(&system, &mut t, &mut state, dt);

        for i in 0..state.len() {
            assert_abs_diff_eq!(state[i], start[i] + dt * system.rates[i], epsilon = 1e-15);
        }
        assert_eq!(t, dt);
    }

    #[test]
    fn decay_matches_fourth_order_taylor_polynomial() {
        // For x' = -x one RK4 step multiplies by 1 - h + h^2/2 - h^3/6 + h^4/24.
        let mut stepper = RK4::new(1);
        let mut state = vec![1.0];
        let mut t = 0.0;
        let h: f64 = 0.1;

        stepper.step(&Decay, &mut t, &mut state, h);

        let expected = 1.0 - h + h.powi(2) / 2.0 - h.powi(3) / 6.0 + h.powi(4) / 24.0;
        assert_abs_diff_eq!(state[0], expected, epsilon = 1e-15);
    }

    #[test]
    fn decay_converges_to_exponential() {
        let mut stepper = RK4::new(1);
        let mut state = vec![1.0];
        let mut t = 0.0;
        for _ in 0..100 {
            stepper.step(&Decay, &mut t, &mut state, 0.01);
        }
        assert_abs_diff_eq!(t, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(state[0], (-1.0f64).exp(), epsilon = 1e-10);
    }
}
