//! Status policy: turns endpoint history into a weight and a verdict

use crate::endpoint::{EndpointStatus, WeightedEndpointStatus};

/// Computes an endpoint's weight and status from its history.
///
/// Implementations update the endpoint in place and return whether either
/// the weight or the status changed.
pub trait StatusEvaluator: Send + Sync + 'static {
    /// Re-assess `endpoint`
    fn evaluate(&self, endpoint: &mut WeightedEndpointStatus) -> bool;
}

impl<F> StatusEvaluator for F
where
    F: Fn(&mut WeightedEndpointStatus) -> bool + Send + Sync + 'static,
{
    fn evaluate(&self, endpoint: &mut WeightedEndpointStatus) -> bool {
        self(endpoint)
    }
}

/// Default policy.
///
/// The weight is the fraction of retained samples that succeeded, measured
/// against the full history capacity. The status becomes
/// [`EndpointStatus::TooManyErrors`] (with weight 0) only when every slot of a
/// full history is an error, and is cleared as soon as that stops being true,
/// which in practice means the instant a success is recorded.
///
/// History-less endpoints (capacity 0) are left untouched.
#[allow(clippy::cast_precision_loss)]
pub fn simple_weighted_evaluator(endpoint: &mut WeightedEndpointStatus) -> bool {
    let capacity = endpoint.capacity();
    if capacity == 0 {
        return false;
    }

    let error_count = endpoint.history().iter().filter(|s| s.is_error()).count();

    let (new_weight, new_status) = if error_count == capacity {
        (0.0, EndpointStatus::TooManyErrors)
    } else {
        (
            1.0 - error_count as f32 / capacity as f32,
            EndpointStatus::Unset,
        )
    };

    #[allow(clippy::float_cmp)]
    let changed = new_weight != endpoint.weight() || new_status != endpoint.status();

    endpoint.set_weight(new_weight);
    endpoint.set_status(new_status);
    changed
}
