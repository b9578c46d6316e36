use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::iter::LanesMut;
use ndarray::{Array2, ArrayViewMut1, ArrayViewMut2, Axis, Ix1, Zip};
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftDirection, FftPlanner};

/// Unitary 2D forward FFT, origin at index (0, 0).
pub fn fft2(mut input: Array2<Complex<f64>>) -> Array2<Complex<f64>> {
    _fft2(input.view_mut(), FftDirection::Forward);
    input
}

/// Unitary 2D inverse FFT, origin at index (0, 0).
///
/// Both directions are scaled by `1/sqrt(rows * cols)` so `ifft2(fft2(x)) == x`.
pub fn ifft2(mut input: Array2<Complex<f64>>) -> Array2<Complex<f64>> {
    _fft2(input.view_mut(), FftDirection::Inverse);
    input
}

fn _fft2(mut input: ArrayViewMut2<Complex<f64>>, direction: FftDirection) {
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft(input.shape()[1], direction);
    let fft_col = planner.plan_fft(input.shape()[0], direction);
    let normalisation = 1.0 / ((input.shape()[0] * input.shape()[1]) as f64).sqrt();

    // fft along axis1, iteration over axis0
    transform_lanes(input.rows_mut(), fft_row.as_ref(), 1.0);
    // fft along axis0, iteration over axis1
    transform_lanes(input.columns_mut(), fft_col.as_ref(), normalisation);
}

// Lanes are copied through a contiguous buffer so strided views work too.
fn transform_lanes(lanes: LanesMut<Complex<f64>, Ix1>, fft: &dyn Fft<f64>, scale: f64) {
    Zip::from(lanes).into_par_iter().for_each_init(
        || {
            (
                vec![Zero::zero(); fft.len()],
                vec![Zero::zero(); fft.get_inplace_scratch_len()],
            )
        },
        |(buffer, scratch), (mut lane,)| {
            debug_assert_eq!(lane.len(), buffer.len());
            for (b, &e) in buffer.iter_mut().zip(lane.iter()) {
                *b = e;
            }
            fft.process_with_scratch(buffer, scratch);
            for (e, &b) in lane.iter_mut().zip(buffer.iter()) {
                *e = b * scale;
            }
        },
    );
}

/// Moves the origin (0, 0) to the "center" of the array (H/2, W/2)
///
/// For even array lengths, which have no center value, this moves the value to the next value after the center
pub fn fft2_shift_inplace<T: Copy + Send>(mut input: ArrayViewMut2<T>) {
    Zip::from(input.lanes_mut(Axis(1))).par_for_each(|row| {
        fft_shift_inplace(row);
    });

    Zip::from(input.lanes_mut(Axis(0))).par_for_each(|col| {
        fft_shift_inplace(col);
    });
}

/// Moves the "center" of the array (H/2, W/2) to the origin (0, 0)
///
/// Inverts fft_shift exactly, accounting for the asymmetry of even arrays
pub fn ifft2_shift_inplace<T: Copy + Send>(mut input: ArrayViewMut2<T>) {
    Zip::from(input.lanes_mut(Axis(1))).par_for_each(|row| {
        ifft_shift_inplace(row);
    });

    Zip::from(input.lanes_mut(Axis(0))).par_for_each(|col| {
        ifft_shift_inplace(col);
    });
}

/// Moves the origin (0) to the "center" of the array (N/2)
///
/// For even array lengths, which have no center value, this moves the value to the next value after the center
pub fn fft_shift_inplace<T: Copy>(mut input: ArrayViewMut1<T>) {
    if input.len() % 2 == 0 {
        return shift_even(input);
    }

    let len = input.len();
    let half = len / 2;

    let mut i = len;
    let mut j = half;
    let mut temp = input[half];
    for _ in 0..half {
        i -= 1;
        j -= 1;
        std::mem::swap(&mut temp, &mut input[i]);
        std::mem::swap(&mut temp, &mut input[j]);
    }
    input[half] = temp;
}

/// Moves the "center" of the array (N/2) to the origin (0)
///
/// Inverts fft_shift exactly, accounting for the asymmetry of even arrays
pub fn ifft_shift_inplace<T: Copy>(mut input: ArrayViewMut1<T>) {
    if input.len() % 2 == 0 {
        return shift_even(input);
    }

    let half = input.len() / 2;

    let mut j = half + 1;
    let mut temp = input[half];
    for i in 0..half {
        std::mem::swap(&mut temp, &mut input[i]);
        std::mem::swap(&mut temp, &mut input[j]);
        j += 1;
    }
    input[half] = temp;
}

fn shift_even<T: Copy>(mut input: ArrayViewMut1<T>) {
    let half = input.len() / 2;
    for i in 0..half {
        input.swap(i, i + half);
    }
}
