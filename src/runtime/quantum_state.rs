use crate::kernels;
use crate::numeric;
use num_complex::Complex32;
use rayon::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

// register size bounds; sizes are even so the amplitude grid the host
// renders stays square
pub const MIN_QUBITS: usize = 6;
pub const MAX_QUBITS: usize = 22;

/// validates a requested register size.
pub fn check_register_size(bits: i64) -> Result<usize, String> {
    if bits < MIN_QUBITS as i64 || bits > MAX_QUBITS as i64 || bits % 2 != 0 {
        return Err(format!("VectorSize out of range: {}", bits));
    }
    Ok(bits as usize)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QuantumState {
    /// number of qubits
    pub n: usize,
    /// 2^n complex amplitudes
    pub amps: Vec<Complex32>,
    // rng for measurements and decoherence; not part of the state's data
    #[serde(skip_serializing, skip_deserializing)]
    rng: Option<StdRng>,
}

impl QuantumState {
    /// a fresh n-qubit register in |0...0>.
    pub fn new(n_qubits: usize) -> Self {
        let n = n_qubits.max(1);
        let mut amps = vec![Complex32::new(0.0, 0.0); 1 << n];
        kernels::reset(&mut amps);
        QuantumState {
            n,
            amps,
            rng: Some(StdRng::from_os_rng()),
        }
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    fn rng(&mut self) -> &mut StdRng {
        self.rng.get_or_insert_with(StdRng::from_os_rng)
    }

    fn check_qubit(&self, q: i64) -> Result<usize, String> {
        if q < 0 || q >= self.n as i64 {
            return Err(format!("Qubit number out of range: {}", q));
        }
        Ok(q as usize)
    }

    pub fn get_amp(&self, index: usize) -> Option<&Complex32> {
        self.amps.get(index)
    }

    pub fn get_probabilities(&self) -> Vec<f64> {
        self.amps.iter().map(|a| a.norm_sqr() as f64).collect()
    }

    pub fn norm_sqr_sum(&self) -> f64 {
        kernels::norm_sqr_sum(&self.amps)
    }

    pub fn normalize(&mut self) {
        kernels::normalize(&mut self.amps);
    }

    pub fn max_amplitude(&self) -> f32 {
        kernels::max_amplitude(&self.amps)
    }

    // --- single-qubit gates ---

    /// arbitrary 2x2 unitary [u00, u01, u10, u11] on qubit `q`.
    pub fn apply_unitary(&mut self, q: i64, u: [Complex32; 4]) -> Result<(), String> {
        let q = self.check_qubit(q)?;
        kernels::apply_single_qubit(&mut self.amps, q, u);
        Ok(())
    }

    pub fn apply_hadamard(&mut self, q: i64) -> Result<(), String> {
        let q = self.check_qubit(q)?;
        kernels::apply_hadamard(&mut self.amps, q);
        Ok(())
    }

    pub fn apply_sigma_x(&mut self, q: i64) -> Result<(), String> {
        let q = self.check_qubit(q)?;
        kernels::apply_sigma_x(&mut self.amps, q);
        Ok(())
    }

    pub fn apply_sigma_y(&mut self, q: i64) -> Result<(), String> {
        let q = self.check_qubit(q)?;
        kernels::apply_sigma_y(&mut self.amps, q);
        Ok(())
    }

    pub fn apply_sigma_z(&mut self, q: i64) -> Result<(), String> {
        let q = self.check_qubit(q)?;
        kernels::apply_sigma_z(&mut self.amps, q);
        Ok(())
    }

    /// rotation about x by `theta`, with the +i off-diagonal convention.
    pub fn apply_rx(&mut self, q: i64, theta: f64) -> Result<(), String> {
        let half = (theta / 2.0) as f32;
        let c = Complex32::new(half.cos(), 0.0);
        let s = Complex32::new(0.0, half.sin());
        self.apply_unitary(q, [c, s, s, c])
    }

    pub fn apply_ry(&mut self, q: i64, theta: f64) -> Result<(), String> {
        let half = (theta / 2.0) as f32;
        let c = Complex32::new(half.cos(), 0.0);
        let s = Complex32::new(half.sin(), 0.0);
        self.apply_unitary(q, [c, s, -s, c])
    }

    /// diagonal rotation: e^{+i theta/2} on |0>, e^{-i theta/2} on |1>.
    pub fn apply_rz(&mut self, q: i64, theta: f64) -> Result<(), String> {
        let q = self.check_qubit(q)?;
        kernels::apply_z_rotation(&mut self.amps, q, theta as f32);
        Ok(())
    }

    // --- multi-qubit gates ---

    /// controlled-not as the two-control gate with both controls on `c`.
    pub fn apply_cnot(&mut self, c: i64, t: i64) -> Result<(), String> {
        self.apply_toffoli(c, c, t)
    }

    pub fn apply_toffoli(&mut self, c1: i64, c2: i64, t: i64) -> Result<(), String> {
        let c1 = self.check_qubit(c1)?;
        let c2 = self.check_qubit(c2)?;
        let t = self.check_qubit(t)?;
        if t == c1 || t == c2 {
            return Err(format!(
                "Control and target qubits must be distinct: {} {} {}",
                c1, c2, t
            ));
        }
        kernels::apply_toffoli(&mut self.amps, c1, c2, t);
        Ok(())
    }

    pub fn apply_swap(&mut self, a: i64, b: i64) -> Result<(), String> {
        let a = self.check_qubit(a)?;
        let b = self.check_qubit(b)?;
        if a != b {
            kernels::apply_swap(&mut self.amps, a, b);
        }
        Ok(())
    }

    /// phase e^{i phi} where both bits are set; `c == t` phases one qubit.
    pub fn apply_cphase(&mut self, c: i64, t: i64, phi: f64) -> Result<(), String> {
        let c = self.check_qubit(c)?;
        let t = self.check_qubit(t)?;
        kernels::apply_cphase(&mut self.amps, c, t, phi as f32);
        Ok(())
    }

    pub fn apply_phase(&mut self, b: i64, phi: f64) -> Result<(), String> {
        self.apply_cphase(b, b, phi)
    }

    /// the qft ladder phase: phi = sign * pi / 2^(c - t), requiring c > t.
    pub fn apply_phase_shift(&mut self, c: i64, t: i64, sign: i32) -> Result<(), String> {
        let c = self.check_qubit(c)?;
        let t = self.check_qubit(t)?;
        if c <= t {
            return Err(format!(
                "Phase shift control must exceed target: {} <= {}",
                c, t
            ));
        }
        let phi = sign as f64 * std::f64::consts::PI / (1u64 << (c - t)) as f64;
        kernels::apply_cphase(&mut self.amps, c, t, phi as f32);
        Ok(())
    }

    // --- composite transforms ---

    pub fn apply_qft(&mut self, offset: i64, width: i64) -> Result<(), String> {
        let (offset, width) = self.check_window(offset, width)?;
        for i in 0..width {
            self.apply_hadamard((offset + i) as i64)?;
            for j in i + 1..width {
                self.apply_phase_shift((offset + j) as i64, (offset + i) as i64, -1)?;
            }
        }
        Ok(())
    }

    pub fn apply_inv_qft(&mut self, offset: i64, width: i64) -> Result<(), String> {
        let (offset, width) = self.check_window(offset, width)?;
        for i in (0..width).rev() {
            for j in (i + 1..width).rev() {
                self.apply_phase_shift((offset + j) as i64, (offset + i) as i64, 1)?;
            }
            self.apply_hadamard((offset + i) as i64)?;
        }
        Ok(())
    }

    fn check_window(&self, offset: i64, width: i64) -> Result<(usize, usize), String> {
        if offset < 0 || width < 0 || offset + width > self.n as i64 {
            return Err(format!(
                "Qubit number out of range: {}",
                offset + width - 1
            ));
        }
        Ok((offset as usize, width as usize))
    }

    /// classical left shift of the basis-state index by `b` bits.
    pub fn shift_left(&mut self, b: i64) -> Result<(), String> {
        if b < 0 {
            return Err(format!("Shift count out of range: {}", b));
        }
        kernels::shift_left(&mut self.amps, b as usize);
        Ok(())
    }

    pub fn shift_right(&mut self, b: i64) -> Result<(), String> {
        if b < 0 {
            return Err(format!("Shift count out of range: {}", b));
        }
        kernels::shift_right(&mut self.amps, b as usize);
        Ok(())
    }

    /// |j>|0> -> |j>|x^j mod N> over the w-bit input register. the old
    /// high-register contents are discarded, and the surviving amplitudes
    /// are renormalized.
    pub fn exp_mod_n(&mut self, x: i64, modulus: i64, w: i64) -> Result<(), String> {
        let (x, modulus, w) = self.check_mod_exp(x, modulus, w)?;
        kernels::permute_high_register(&mut self.amps, w, |j| numeric::exp_mod_n(x, j, modulus));
        self.normalize();
        Ok(())
    }

    /// |j>|0> -> |j>|j^x mod N>; the base varies, the exponent is fixed.
    pub fn rev_exp_mod_n(&mut self, x: i64, modulus: i64, w: i64) -> Result<(), String> {
        let (x, modulus, w) = self.check_mod_exp(x, modulus, w)?;
        kernels::permute_high_register(&mut self.amps, w, |j| numeric::exp_mod_n(j, x, modulus));
        self.normalize();
        Ok(())
    }

    fn check_mod_exp(&self, x: i64, modulus: i64, w: i64) -> Result<(u32, u32, u32), String> {
        if x < 0 || x > u32::MAX as i64 {
            return Err(format!("ExpModN base out of range: {}", x));
        }
        if modulus <= 0 || modulus > u32::MAX as i64 {
            return Err(format!("ExpModN modulus out of range: {}", modulus));
        }
        if w < 0 || w > self.n as i64 {
            return Err(format!("ExpModN register width out of range: {}", w));
        }
        Ok((x as u32, modulus as u32, w as u32))
    }

    /// random per-qubit phase kicks: nu ~ N(0, sqrt(2 * strength)) drawn by
    /// the marsaglia polar method, applied as a z-axis rotation by nu.
    /// strength is a variance scale, not a rate.
    pub fn decoherence(&mut self, strength: f64) {
        if strength <= 0.0 {
            return;
        }
        let sigma = (2.0 * strength).sqrt();
        for q in 0..self.n {
            let nu = self.gauss() * sigma;
            kernels::apply_z_rotation(&mut self.amps, q, nu as f32);
        }
    }

    fn gauss(&mut self) -> f64 {
        let rng = self.rng();
        loop {
            let u = 2.0 * rng.random::<f64>() - 1.0;
            let v = 2.0 * rng.random::<f64>() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                return u * (-2.0 * s.ln() / s).sqrt();
            }
        }
    }

    // --- measurement ---

    /// projects qubit `b`, returning the observed bit. disagreeing
    /// amplitudes are zeroed and the remainder renormalized.
    pub fn measure_bit(&mut self, b: i64) -> Result<u64, String> {
        let b = self.check_qubit(b)?;
        let mask = 1usize << b;

        let mut p_zero = 0.0f64;
        let mut p_one = 0.0f64;
        for (i, amp) in self.amps.iter().enumerate() {
            let p = amp.norm_sqr() as f64;
            if i & mask == 0 {
                p_zero += p;
            } else {
                p_one += p;
            }
        }

        let r: f64 = self.rng().random();
        let outcome: u64 = if r > p_zero { 1 } else { 0 };
        let p_outcome = if outcome == 0 { p_zero } else { p_one };
        let factor = if p_outcome > 1e-12 {
            (1.0 / p_outcome.sqrt()) as f32
        } else {
            0.0
        };

        self.amps.par_iter_mut().enumerate().for_each(|(i, amp)| {
            let bit = ((i & mask) != 0) as u64;
            if bit == outcome {
                *amp *= factor;
            } else {
                *amp = Complex32::new(0.0, 0.0);
            }
        });
        Ok(outcome)
    }

    /// samples a full basis-state observation weighted by |V[i]|^2 without
    /// collapsing the vector. the total may be below one after shifts or
    /// decoherence; the draw is scaled accordingly.
    pub fn measure(&mut self) -> u64 {
        let total = self.norm_sqr_sum();
        if total <= 0.0 {
            return 0;
        }
        let threshold = self.rng().random::<f64>() * total;
        let mut cumulative = 0.0f64;
        for (i, amp) in self.amps.iter().enumerate() {
            cumulative += amp.norm_sqr() as f64;
            if cumulative >= threshold {
                return i as u64;
            }
        }
        (self.amps.len() - 1) as u64
    }
}
