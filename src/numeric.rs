// integer helpers shared by the compiler, the engine and the simulator.
// the modular-exponent routines stay in 32-bit value range like the
// classical pre/post-processing of shor's algorithm they serve.

/// a^b for non-negative integer b by repeated squaring.
pub fn ipow(a: i64, b: u32) -> i64 {
    let mut result = 1i64;
    let mut base = a;
    let mut exp = b;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    result
}

/// euclid's algorithm.
pub fn gcd(u: i64, v: i64) -> i64 {
    let mut a = u.abs();
    let mut b = v.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// smallest i with 2^i >= n.
pub fn get_width(n: u64) -> u32 {
    let mut i = 0;
    while (1u64 << i) < n {
        i += 1;
    }
    i
}

/// smallest positive i with (i * c) mod n == 1, by brute search.
/// callers guarantee an inverse exists (gcd(c, n) == 1); when it does not,
/// the search exhausts the residues and returns 0.
pub fn inverse_mod(n: i64, c: i64) -> i64 {
    if n <= 1 {
        return 0;
    }
    for i in 1..=n {
        if (i * c) % n == 1 {
            return i;
        }
    }
    0
}

/// x^k mod n via right-to-left binary exponentiation on 32-bit values.
pub fn exp_mod_n(x: u32, k: u32, n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    if n == 1 {
        return 0;
    }
    let m = n as u64;
    let mut result = 1u64;
    let mut base = (x as u64) % m;
    let mut exp = k;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % m;
        }
        base = base * base % m;
        exp >>= 1;
    }
    result as u32
}

/// best rational p/q with q <= 2^width approximating a/b, by continued
/// fractions. exits early once the convergent is within 1/2^(width+1) of
/// the target; the 5e-6 guard keeps the floor step from slipping below an
/// integer boundary.
pub fn frac_approx(a: i64, b: i64, width: u32) -> (i64, i64) {
    if b == 0 {
        return (0, 1);
    }
    let f = a as f64 / b as f64;
    let max_den = 1i64 << width;
    let tolerance = 1.0 / (2.0 * max_den as f64);

    let mut g = f;
    let (mut num2, mut den2) = (0i64, 1i64);
    let (mut num1, mut den1) = (1i64, 0i64);
    loop {
        let i = (g + 5e-6).floor() as i64;
        g -= i as f64 - 5e-6;
        let num = i * num1 + num2;
        let den = i * den1 + den2;
        if den > max_den {
            break; // keep the previous convergent
        }
        num2 = num1;
        den2 = den1;
        num1 = num;
        den1 = den;
        if den == 0 {
            break;
        }
        if ((num as f64 / den as f64) - f).abs() <= tolerance {
            break;
        }
        if g.abs() < 1e-12 {
            break;
        }
        g = 1.0 / g;
    }
    if den1 == 0 {
        (0, 1)
    } else {
        (num1, den1)
    }
}
