//! Polynomials and other functions used to build bases
//!
//! Each function tabulates one family at a point, returning the values and the
//! derivatives. Derivatives are stored direction-major: the derivative of function
//! `i` in local direction `d` is at `d * n + i`, where `n` is the number of functions.

use crate::types::FeValue;
use itertools::Itertools;
use std::f64::consts::PI;

/// Tabulate the Lagrange polynomials through equally spaced points in [0, 1]
pub fn tabulate_lagrange(order: usize, x: FeValue) -> (Vec<FeValue>, Vec<FeValue>) {
    let xs = (0..=order)
        .map(|i| i as FeValue / order as FeValue)
        .collect::<Vec<_>>();
    let values = xs
        .iter()
        .enumerate()
        .map(|(j, &xj)| {
            xs.iter()
                .enumerate()
                .filter(|(m, _)| *m != j)
                .map(|(_, &xm)| (x - xm) / (xj - xm))
                .product()
        })
        .collect();
    let derivatives = xs
        .iter()
        .enumerate()
        .map(|(j, &xj)| {
            xs.iter()
                .enumerate()
                .filter(|(i, _)| *i != j)
                .map(|(i, &xi)| {
                    1.0 / (xj - xi)
                        * xs.iter()
                            .enumerate()
                            .filter(|(m, _)| *m != i && *m != j)
                            .map(|(_, &xm)| (x - xm) / (xj - xm))
                            .product::<FeValue>()
                })
                .sum()
        })
        .collect();
    (values, derivatives)
}

/// Tabulate a 1D family given its monomial coefficients
///
/// Row `i` of `coefficients` holds the coefficients of 1, x, x^2, ... for function `i`.
fn tabulate_from_monomials<const N: usize>(
    coefficients: &[[FeValue; N]],
    x: FeValue,
) -> (Vec<FeValue>, Vec<FeValue>) {
    let values = coefficients
        .iter()
        .map(|row| row.iter().rev().fold(0.0, |acc, c| acc * x + c))
        .collect();
    let derivatives = coefficients
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .skip(1)
                .rev()
                .fold(0.0, |acc, (k, c)| acc * x + k as FeValue * c)
        })
        .collect();
    (values, derivatives)
}

/// Tabulate the cubic Hermite functions
///
/// The functions are ordered: value at 0, derivative at 0, value at 1, derivative at 1.
pub fn tabulate_cubic_hermite(x: FeValue) -> (Vec<FeValue>, Vec<FeValue>) {
    tabulate_from_monomials(
        &[
            [1.0, 0.0, -3.0, 2.0],
            [0.0, 1.0, -2.0, 1.0],
            [0.0, 0.0, 3.0, -2.0],
            [0.0, 0.0, -1.0, 1.0],
        ],
        x,
    )
}

/// Tabulate the quadratic functions with a value at 0 and a value and derivative at 1
pub fn tabulate_lagrange_hermite(x: FeValue) -> (Vec<FeValue>, Vec<FeValue>) {
    tabulate_from_monomials(
        &[[1.0, -2.0, 1.0], [0.0, 2.0, -1.0], [0.0, -1.0, 1.0]],
        x,
    )
}

/// Tabulate the quadratic functions with a value and derivative at 0 and a value at 1
pub fn tabulate_hermite_lagrange(x: FeValue) -> (Vec<FeValue>, Vec<FeValue>) {
    tabulate_from_monomials(&[[1.0, 0.0, -1.0], [0.0, 1.0, -1.0], [0.0, 0.0, 1.0]], x)
}

/// Tabulate the monomials 1, x, ..., x^order
pub fn tabulate_monomials(order: usize, x: FeValue) -> (Vec<FeValue>, Vec<FeValue>) {
    let values = (0..=order).map(|k| x.powi(k as i32)).collect();
    let derivatives = (0..=order)
        .map(|k| {
            if k == 0 {
                0.0
            } else {
                k as FeValue * x.powi(k as i32 - 1)
            }
        })
        .collect();
    (values, derivatives)
}

/// Tabulate the Fourier functions 1, cos(2 pi x), sin(2 pi x), ... up to sin(2 pi order x)
pub fn tabulate_fourier(order: usize, x: FeValue) -> (Vec<FeValue>, Vec<FeValue>) {
    let mut values = vec![1.0];
    let mut derivatives = vec![0.0];
    for k in 1..=order {
        let w = 2.0 * PI * k as FeValue;
        values.push((w * x).cos());
        values.push((w * x).sin());
        derivatives.push(-w * (w * x).sin());
        derivatives.push(w * (w * x).cos());
    }
    (values, derivatives)
}

/// The lattice points of a simplex of the given dimension and order
///
/// The first direction varies fastest.
pub fn simplex_lattice(dim: usize, order: usize) -> Vec<Vec<usize>> {
    (0..dim)
        .map(|_| 0..=order)
        .multi_cartesian_product()
        .filter(|p| p.iter().sum::<usize>() <= order)
        .sorted_by(|a, b| a.iter().rev().cmp(b.iter().rev()))
        .collect()
}

/// The Silvester polynomial R_k(l) = prod_{i<k} (order l - i) / (i + 1) and its derivative
fn silvester(order: usize, k: usize, l: FeValue) -> (FeValue, FeValue) {
    let n = order as FeValue;
    let factors = (0..k)
        .map(|i| (n * l - i as FeValue) / (i + 1) as FeValue)
        .collect::<Vec<_>>();
    let value = factors.iter().product();
    let derivative = (0..k)
        .map(|j| {
            n / (j + 1) as FeValue
                * factors
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != j)
                    .map(|(_, f)| f)
                    .product::<FeValue>()
        })
        .sum();
    (value, derivative)
}

/// Tabulate the Lagrange functions of the given order on a simplex
///
/// The functions are ordered as the points of [simplex_lattice].
pub fn tabulate_simplex(order: usize, xi: &[FeValue]) -> (Vec<FeValue>, Vec<FeValue>) {
    let dim = xi.len();
    let lattice = simplex_lattice(dim, order);
    let n = lattice.len();
    let l0 = 1.0 - xi.iter().sum::<FeValue>();
    let mut values = vec![0.0; n];
    let mut derivatives = vec![0.0; n * dim];
    for (f, point) in lattice.iter().enumerate() {
        let k0 = order - point.iter().sum::<usize>();
        let (r0, dr0) = silvester(order, k0, l0);
        let factors = silvester_factors(order, point, xi);
        let product = factors.iter().map(|(r, _)| r).product::<FeValue>();
        values[f] = r0 * product;
        for d in 0..dim {
            let others = factors
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != d)
                .map(|(_, (r, _))| r)
                .product::<FeValue>();
            derivatives[d * n + f] = r0 * factors[d].1 * others - dr0 * product;
        }
    }
    (values, derivatives)
}

fn silvester_factors(order: usize, point: &[usize], xi: &[FeValue]) -> Vec<(FeValue, FeValue)> {
    point
        .iter()
        .zip(xi)
        .map(|(k, x)| silvester(order, *k, *x))
        .collect()
}

/// Tabulate the linear polygon functions
///
/// `xi[0]` is the circumferential direction and `xi[1]` the radial direction. The
/// first function is the centre node, followed by the nodes around the edge.
pub fn tabulate_polygon(sides: usize, xi: &[FeValue]) -> (Vec<FeValue>, Vec<FeValue>) {
    let n = sides + 1;
    let (around, radius) = (xi[0], xi[1]);
    let s = sides as FeValue * around;
    let segment = (s.floor().max(0.0) as usize).min(sides - 1);
    let t = s - segment as FeValue;
    let next = (segment + 1) % sides;

    let mut values = vec![0.0; n];
    let mut derivatives = vec![0.0; 2 * n];
    values[0] = 1.0 - radius;
    derivatives[n] = -1.0;

    values[1 + segment] = radius * (1.0 - t);
    values[1 + next] = radius * t;
    derivatives[1 + segment] = -radius * sides as FeValue;
    derivatives[1 + next] = radius * sides as FeValue;
    derivatives[n + 1 + segment] = 1.0 - t;
    derivatives[n + 1 + next] = t;
    (values, derivatives)
}
