use nalgebra as na;
use num_traits::Float;

use crate::config::FilterConfig;

/// Constant-velocity linear filter over `[x, y, vx, vy]`, observing `(x, y)`.
///
/// The first observation after a reset seeds the position with zero velocity;
/// until then the estimate is the origin.
#[derive(Debug, Clone)]
pub struct PositionFilter<F = f32>
where
    F: na::RealField + Float,
{
    state: na::Vector4<F>,
    covariance: na::Matrix4<F>,
    transition: na::Matrix4<F>,
    observation: na::Matrix2x4<F>,
    process_noise: na::Matrix4<F>,
    measurement_noise: na::Matrix2<F>,
    initial_covariance: F,
    initialized: bool,
}

impl<F> PositionFilter<F>
where
    F: na::RealField + Float,
{
    pub fn new(config: &FilterConfig) -> Self {
        let (o, l) = (F::zero(), F::one());
        let initial_covariance: F = na::convert(config.initial_covariance as f64);
        let process_noise: F = na::convert(config.process_noise as f64);
        let measurement_noise: F = na::convert(config.measurement_noise as f64);

        let transition = na::Matrix4::new(
            l, o, l, o, //
            o, l, o, l, //
            o, o, l, o, //
            o, o, o, l,
        );
        let observation = na::Matrix2x4::new(
            l, o, o, o, //
            o, l, o, o,
        );

        Self {
            state: na::Vector4::zeros(),
            covariance: na::Matrix4::identity() * initial_covariance,
            transition,
            observation,
            process_noise: na::Matrix4::identity() * process_noise,
            measurement_noise: na::Matrix2::identity() * measurement_noise,
            initial_covariance,
            initialized: false,
        }
    }

    /// Filter already moving at `(vx, vy)` from `(x, y)`.
    pub fn with_state(config: &FilterConfig, x: F, y: F, vx: F, vy: F) -> Self {
        let mut filter = Self::new(config);
        filter.state = na::Vector4::new(x, y, vx, vy);
        filter.initialized = true;
        filter
    }

    pub fn reset(&mut self) {
        self.state = na::Vector4::zeros();
        self.covariance = na::Matrix4::identity() * self.initial_covariance;
        self.initialized = false;
    }

    pub fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    pub fn correct(&mut self, x: F, y: F) {
        if !self.initialized {
            self.state = na::Vector4::new(x, y, F::zero(), F::zero());
            self.covariance = na::Matrix4::identity() * self.initial_covariance;
            self.initialized = true;
            return;
        }

        let residual = na::Vector2::new(x, y) - self.observation * self.state;
        let innovation = self.observation * self.covariance * self.observation.transpose()
            + self.measurement_noise;

        let inv = match innovation.try_inverse() {
            Some(inv) => inv,
            None => {
                log::warn!("singular innovation covariance, skipping correction");
                return;
            }
        };

        let gain = self.covariance * self.observation.transpose() * inv;

        self.state += gain * residual;
        self.covariance = (na::Matrix4::identity() - gain * self.observation) * self.covariance;
    }

    /// Advances one frame: predict, then correct when a point was observed.
    pub fn step(&mut self, observation: Option<(F, F)>) -> na::Point2<F> {
        match observation {
            Some((x, y)) if self.initialized => {
                self.predict();
                self.correct(x, y);
            }
            Some((x, y)) => self.correct(x, y),
            None => self.predict(),
        }

        self.position()
    }

    #[inline]
    pub fn position(&self) -> na::Point2<F> {
        na::Point2::new(self.state[0], self.state[1])
    }

    #[inline]
    pub fn velocity(&self) -> na::Vector2<F> {
        na::Vector2::new(self.state[2], self.state[3])
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl<F> Default for PositionFilter<F>
where
    F: na::RealField + Float,
{
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn stationary_observations_converge() {
        let mut filter = PositionFilter::<f32>::default();

        let mut last = na::Point2::origin();
        for _ in 0..10 {
            last = filter.step(Some((50.0, 50.0)));
        }

        assert_abs_diff_eq!(last.x, 50.0, epsilon = 1.0);
        assert_abs_diff_eq!(last.y, 50.0, epsilon = 1.0);

        for _ in 0..5 {
            let p = filter.step(Some((50.0, 50.0)));
            assert_abs_diff_eq!(p.x, 50.0, epsilon = 1.0);
            assert_abs_diff_eq!(p.y, 50.0, epsilon = 1.0);
        }
    }

    #[test]
    fn coasts_along_known_velocity() {
        let mut filter =
            PositionFilter::<f32>::with_state(&FilterConfig::default(), 10.0, 20.0, 2.0, 0.0);

        let mut prev = filter.position();
        for _ in 0..5 {
            let p = filter.step(None);
            assert_abs_diff_eq!(p.x - prev.x, 2.0, epsilon = 1e-4);
            assert_abs_diff_eq!(p.y, 20.0, epsilon = 1e-4);
            prev = p;
        }
    }

    #[test]
    fn learns_velocity_from_moving_observations() {
        let mut filter = PositionFilter::<f32>::default();

        for i in 0..15 {
            filter.step(Some((2.0 * i as f32, 10.0)));
        }

        assert_abs_diff_eq!(filter.velocity().x, 2.0, epsilon = 0.05);

        let mut prev = filter.position();
        for _ in 0..5 {
            let p = filter.step(None);
            assert!(p.x > prev.x);
            assert_abs_diff_eq!(p.x - prev.x, 2.0, epsilon = 0.1);
            prev = p;
        }
    }

    #[test]
    fn fresh_filter_sits_at_origin() {
        let mut filter = PositionFilter::<f32>::default();
        assert!(!filter.is_initialized());
        assert_eq!(filter.step(None), na::Point2::origin());
    }

    #[test]
    fn first_observation_seeds_position() {
        let mut filter = PositionFilter::<f32>::default();
        let p = filter.step(Some((320.0, 180.0)));

        assert_eq!(p, na::Point2::new(320.0, 180.0));
        assert_eq!(filter.velocity(), na::Vector2::zeros());
    }

    #[test]
    fn reset_restores_default() {
        let mut filter = PositionFilter::<f32>::default();
        filter.step(Some((5.0, 5.0)));
        filter.step(Some((9.0, 5.0)));

        filter.reset();

        assert!(!filter.is_initialized());
        assert_eq!(filter.step(None), na::Point2::origin());
    }

    #[test]
    fn works_in_double_precision() {
        let mut filter = PositionFilter::<f64>::default();
        for _ in 0..3 {
            filter.step(Some((1.5, -2.5)));
        }
        assert_abs_diff_eq!(filter.position().x, 1.5, epsilon = 1e-9);
    }
}
