// amplitude-vector kernels.
//
// every gate is an in-place transform over a slice of 2^n complex
// amplitudes. non-diagonal gates snapshot the previous amplitudes and fill
// the new vector with rayon; diagonal gates mutate in place. probability
// accumulation runs in f64 so large vectors do not lose the tail.

use num_complex::Complex32;
use rayon::prelude::*;

/// resets the vector to |0...0>.
pub fn reset(amps: &mut [Complex32]) {
    amps.par_iter_mut().for_each(|a| *a = Complex32::new(0.0, 0.0));
    if let Some(first) = amps.first_mut() {
        *first = Complex32::new(1.0, 0.0);
    }
}

/// applies a 2x2 unitary [u00, u01, u10, u11] to qubit `q`.
pub fn apply_single_qubit(amps: &mut [Complex32], q: usize, u: [Complex32; 4]) {
    let mask = 1usize << q;
    let old = amps.to_vec();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        if i & mask == 0 {
            *amp = u[0] * old[i] + u[1] * old[i | mask];
        } else {
            *amp = u[2] * old[i ^ mask] + u[3] * old[i];
        }
    });
}

pub fn apply_hadamard(amps: &mut [Complex32], q: usize) {
    let h = Complex32::new(std::f32::consts::FRAC_1_SQRT_2, 0.0);
    apply_single_qubit(amps, q, [h, h, h, -h]);
}

pub fn apply_sigma_x(amps: &mut [Complex32], q: usize) {
    let mask = 1usize << q;
    let old = amps.to_vec();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        *amp = old[i ^ mask];
    });
}

pub fn apply_sigma_y(amps: &mut [Complex32], q: usize) {
    let mask = 1usize << q;
    let i_unit = Complex32::new(0.0, 1.0);
    let old = amps.to_vec();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        // swap the pair with a factor of -i on the 0-branch, +i on the 1-branch
        if i & mask == 0 {
            *amp = -i_unit * old[i | mask];
        } else {
            *amp = i_unit * old[i ^ mask];
        }
    });
}

pub fn apply_sigma_z(amps: &mut [Complex32], q: usize) {
    let mask = 1usize << q;
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        if i & mask != 0 {
            *amp = -*amp;
        }
    });
}

/// flips the target bit wherever both control bits are set. the controls
/// may coincide, which degenerates to a controlled-not.
pub fn apply_toffoli(amps: &mut [Complex32], c1: usize, c2: usize, t: usize) {
    let c1_mask = 1usize << c1;
    let c2_mask = 1usize << c2;
    let t_mask = 1usize << t;
    let old = amps.to_vec();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        if i & c1_mask != 0 && i & c2_mask != 0 {
            *amp = old[i ^ t_mask];
        }
    });
}

pub fn apply_swap(amps: &mut [Complex32], a: usize, b: usize) {
    let a_mask = 1usize << a;
    let b_mask = 1usize << b;
    let old = amps.to_vec();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        if (i & a_mask != 0) != (i & b_mask != 0) {
            *amp = old[i ^ (a_mask | b_mask)];
        }
    });
}

/// multiplies by e^{i phi} wherever both the control and target bits are
/// set; with c == t this is a plain phase gate on one qubit.
pub fn apply_cphase(amps: &mut [Complex32], c: usize, t: usize, phi: f32) {
    let c_mask = 1usize << c;
    let t_mask = 1usize << t;
    let phase = Complex32::new(phi.cos(), phi.sin());
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        if i & c_mask != 0 && i & t_mask != 0 {
            *amp *= phase;
        }
    });
}

/// z-axis rotation: e^{+i theta/2} on the 0-branch, e^{-i theta/2} on the
/// 1-branch of qubit `q`.
pub fn apply_z_rotation(amps: &mut [Complex32], q: usize, theta: f32) {
    let mask = 1usize << q;
    let half = theta / 2.0;
    let pos = Complex32::new(half.cos(), half.sin());
    let neg = pos.conj();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        if i & mask == 0 {
            *amp *= pos;
        } else {
            *amp *= neg;
        }
    });
}

/// relabels |k> -> |k << b>; states shifted out of range are dropped.
pub fn shift_left(amps: &mut [Complex32], b: usize) {
    let old = amps.to_vec();
    let low_mask = if b >= usize::BITS as usize {
        usize::MAX
    } else {
        (1usize << b) - 1
    };
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        *amp = if i & low_mask == 0 {
            old[i >> b.min(usize::BITS as usize - 1)]
        } else {
            Complex32::new(0.0, 0.0)
        };
    });
}

/// relabels |k> -> |k >> b>; only source states with zero low bits supply
/// amplitude, the rest are dropped.
pub fn shift_right(amps: &mut [Complex32], b: usize) {
    let old = amps.to_vec();
    let len = amps.len();
    amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
        let src = (i as u64) << b.min(63);
        *amp = if src < len as u64 {
            old[src as usize]
        } else {
            Complex32::new(0.0, 0.0)
        };
    });
}

/// moves amplitude from |j>|0> to |j>|f(j)> for j in the low `w` bits,
/// where `f` maps the basis index to the value stored in the high
/// register. everything outside the w-bit input register is discarded.
pub fn permute_high_register(
    amps: &mut [Complex32],
    w: u32,
    f: impl Fn(u32) -> u32,
) {
    let old = amps.to_vec();
    let len = amps.len();
    amps.iter_mut().for_each(|a| *a = Complex32::new(0.0, 0.0));
    let count = (1usize << w).min(len);
    for j in 0..count {
        let idx = ((f(j as u32) as usize) << w) + j;
        if idx < len {
            amps[idx] = old[j];
        }
    }
}

pub fn norm_sqr_sum(amps: &[Complex32]) -> f64 {
    amps.par_iter().map(|a| a.norm_sqr() as f64).sum()
}

pub fn normalize(amps: &mut [Complex32]) {
    let total = norm_sqr_sum(amps);
    if total > 1e-12 {
        let inv = (1.0 / total.sqrt()) as f32;
        amps.par_iter_mut().for_each(|a| *a *= inv);
    }
}

/// largest per-basis-state magnitude, for display normalization.
pub fn max_amplitude(amps: &[Complex32]) -> f32 {
    amps.par_iter()
        .map(|a| a.norm_sqr())
        .reduce(|| 0.0f32, f32::max)
        .sqrt()
}
