use odmld_types::{OdmlError, PerformanceClass};
use sysinfo::System;

use crate::error::BindingError;
use crate::library::InferenceLibrary;
use crate::params::BenchmarkSample;

/// Total host memory, used to sanity-clamp a benchmark's self-reported
/// device-heap size: a shim running on an integrated GPU can only ever see
/// as much heap as the host has.
fn host_memory_ceiling() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.total_memory()
}

const MIN_DEVICE_HEAP_BYTES: u64 = 3 * 1024 * 1024 * 1024;
const HIGH_DEVICE_HEAP_BYTES: u64 = 7_600 * 1024 * 1024;
const MIN_OUTPUT_TOKENS_PER_SEC: f32 = 5.0;
const INPUT_TOKENS_PER_SEC_THRESHOLDS: [f32; 4] = [50.0, 100.0, 250.0, 750.0];

/// No GPU model is denylisted on this platform today; kept as its own call
/// (rather than folded away) so a future blocklist only has to fill this in,
/// the same shape as the original's own permanently-`false` `IsGpuBlocked`.
fn is_gpu_blocked(_sample: &BenchmarkSample) -> bool {
    false
}

/// Maps a benchmark sample to a `PerformanceClass` using the thresholds
/// named in spec §6/§9: a device-heap and output-speed floor gate
/// everything above `VeryLow`, input-speed buckets the remaining classes,
/// and classes above `Medium` additionally require the larger heap floor.
fn classify(sample: &BenchmarkSample) -> PerformanceClass {
    if is_gpu_blocked(sample) {
        return PerformanceClass::GpuBlocked;
    }

    let device_heap_bytes = if sample.is_integrated_gpu {
        sample.device_heap_bytes.min(host_memory_ceiling())
    } else {
        sample.device_heap_bytes
    };

    if device_heap_bytes < MIN_DEVICE_HEAP_BYTES
        || sample.output_tokens_per_sec < MIN_OUTPUT_TOKENS_PER_SEC
    {
        return PerformanceClass::VeryLow;
    }

    let bucket = INPUT_TOKENS_PER_SEC_THRESHOLDS
        .iter()
        .filter(|t| sample.input_tokens_per_sec >= **t)
        .count();

    let class = match bucket {
        0 => PerformanceClass::Low,
        1 => PerformanceClass::Medium,
        2 => PerformanceClass::High,
        _ => PerformanceClass::VeryHigh,
    };

    if matches!(class, PerformanceClass::High | PerformanceClass::VeryHigh)
        && device_heap_bytes < HIGH_DEVICE_HEAP_BYTES
    {
        return PerformanceClass::Medium;
    }
    class
}

/// Runs the library's tiny benchmark and maps it to a `PerformanceClass`
/// (§4.2 supplement, §6 `GetEstimatedPerformanceClass`), subject to the
/// shim-not-ready retry combinator at the caller's discretion.
pub async fn estimate_class(
    library: &dyn InferenceLibrary,
) -> Result<PerformanceClass, OdmlError> {
    match library.benchmark().await {
        Ok(sample) => Ok(classify(&sample)),
        Err(BindingError::ShimNotReady) | Err(BindingError::MissingEntryPoint(_)) => {
            Ok(PerformanceClass::FailedToLoadLibrary)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(heap_gb: f64, output_tok_s: f32, input_tok_s: f32) -> BenchmarkSample {
        BenchmarkSample {
            device_heap_bytes: (heap_gb * 1024.0 * 1024.0 * 1024.0) as u64,
            max_buffer_bytes: 256 * 1024 * 1024,
            input_tokens_per_sec: input_tok_s,
            output_tokens_per_sec: output_tok_s,
            is_integrated_gpu: false,
        }
    }

    #[test]
    fn never_blocked_today() {
        assert!(!is_gpu_blocked(&sample(8.0, 10.0, 800.0)));
    }

    #[test]
    fn below_floor_is_very_low() {
        assert_eq!(classify(&sample(1.0, 10.0, 1000.0)), PerformanceClass::VeryLow);
        assert_eq!(classify(&sample(4.0, 1.0, 1000.0)), PerformanceClass::VeryLow);
    }

    #[test]
    fn buckets_by_input_speed_above_floor() {
        assert_eq!(classify(&sample(4.0, 10.0, 10.0)), PerformanceClass::Low);
        assert_eq!(classify(&sample(4.0, 10.0, 60.0)), PerformanceClass::Medium);
    }

    #[test]
    fn high_classes_require_the_larger_heap() {
        // Would bucket to High by input speed, but heap is below the floor.
        assert_eq!(classify(&sample(4.0, 10.0, 300.0)), PerformanceClass::Medium);
        assert_eq!(classify(&sample(8.0, 10.0, 300.0)), PerformanceClass::High);
        assert_eq!(classify(&sample(8.0, 10.0, 800.0)), PerformanceClass::VeryHigh);
    }
}
