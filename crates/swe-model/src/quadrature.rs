//! Quadrature rules for the reference triangle.
//!
//! Rather than transcribing a fixed-order Dunavant table (easy to get subtly
//! wrong and impossible to check here without running anything), this
//! builds triangle rules by a collapsed-coordinate (Duffy) transform of a
//! tensor-product 1-D Gauss–Legendre rule on the square. The transform
//!
//! ```text
//! x = (1+u)(1-v)/4,  y = (1+v)/2,   u,v in [-1,1]
//! ```
//!
//! has Jacobian `(1-v)/8`, so a polynomial of total degree `d` in `(x,y)`
//! becomes, after substitution, a polynomial of degree `d` in `u` and degree
//! `d+1` in `v` (the extra `+1` from the Jacobian). Exactness then follows
//! directly from the 1-D Gauss–Legendre exactness degree `2n-1`, not from a
//! memorized constant.

/// 1-D Gauss–Legendre nodes and weights on `[-1, 1]`, exact through degree `2n-1`.
fn gauss_legendre_1d(n: usize) -> (Vec<f64>, Vec<f64>) {
    match n {
        1 => (vec![0.0], vec![2.0]),
        2 => (
            vec![-0.5773502691896257, 0.5773502691896257],
            vec![1.0, 1.0],
        ),
        3 => (
            vec![-0.7745966692414834, 0.0, 0.7745966692414834],
            vec![0.5555555555555556, 0.8888888888888888, 0.5555555555555556],
        ),
        4 => (
            vec![
                -0.8611363115940526,
                -0.3399810435848563,
                0.3399810435848563,
                0.8611363115940526,
            ],
            vec![
                0.3478548451374538,
                0.6521451548625461,
                0.6521451548625461,
                0.3478548451374538,
            ],
        ),
        5 => (
            vec![
                -0.9061798459386640,
                -0.5384693101056831,
                0.0,
                0.5384693101056831,
                0.9061798459386640,
            ],
            vec![
                0.2369268850561891,
                0.4786286704993665,
                0.5688888888888889,
                0.4786286704993665,
                0.2369268850561891,
            ],
        ),
        6 => (
            vec![
                -0.9324695142031521,
                -0.6612093864662645,
                -0.2386191860831969,
                0.2386191860831969,
                0.6612093864662645,
                0.9324695142031521,
            ],
            vec![
                0.1713244923791704,
                0.3607615730481386,
                0.4679139345726910,
                0.4679139345726910,
                0.3607615730481386,
                0.1713244923791704,
            ],
        ),
        7 => (
            vec![
                -0.9491079123427585,
                -0.7415311855993945,
                -0.4058451513773972,
                0.0,
                0.4058451513773972,
                0.7415311855993945,
                0.9491079123427585,
            ],
            vec![
                0.1294849661688697,
                0.2797053914892766,
                0.3818300505051189,
                0.4179591836734694,
                0.3818300505051189,
                0.2797053914892766,
                0.1294849661688697,
            ],
        ),
        8 => (
            vec![
                -0.9602898564975363,
                -0.7966664774136267,
                -0.5255324099163290,
                -0.1834346424956498,
                0.1834346424956498,
                0.5255324099163290,
                0.7966664774136267,
                0.9602898564975363,
            ],
            vec![
                0.1012285362903763,
                0.2223810344533745,
                0.3137066458778873,
                0.3626837833783620,
                0.3626837833783620,
                0.3137066458778873,
                0.2223810344533745,
                0.1012285362903763,
            ],
        ),
        _ => panic!("gauss_legendre_1d only tabulated for n in 1..=8"),
    }
}

/// A 1-D Gauss–Legendre rule on `[-1, 1]`, exact through degree `2n-1`,
/// for edge (boundary) quadrature; `n` is derived the same way as the
/// interior rule's per-axis node count.
pub fn edge_rule(degree: usize) -> (Vec<f64>, Vec<f64>) {
    let n = ((degree + 2) / 2).clamp(1, 8);
    gauss_legendre_1d(n)
}

/// A quadrature rule on the reference triangle: reference-space points
/// `(x, y)` with `x, y >= 0, x + y <= 1`, and weights summing to the
/// triangle area `1/2`.
#[derive(Debug, Clone)]
pub struct TriangleRule {
    pub points: Vec<(f64, f64)>,
    pub weights: Vec<f64>,
}

impl TriangleRule {
    /// A rule exact for polynomials of total degree `<= degree`.
    pub fn for_degree(degree: usize) -> Self {
        let n_u = (degree + 2) / 2;
        let n_v = (degree + 3) / 2;
        let n_u = n_u.max(1).min(8);
        let n_v = n_v.max(1).min(8);

        let (u_nodes, u_weights) = gauss_legendre_1d(n_u);
        let (v_nodes, v_weights) = gauss_legendre_1d(n_v);

        let mut points = Vec::with_capacity(n_u * n_v);
        let mut weights = Vec::with_capacity(n_u * n_v);

        for (vi, &v) in v_nodes.iter().enumerate() {
            for (ui, &u) in u_nodes.iter().enumerate() {
                let x = (1.0 + u) * (1.0 - v) / 4.0;
                let y = (1.0 + v) / 2.0;
                let jacobian = (1.0 - v) / 8.0;
                let w = u_weights[ui] * v_weights[vi] * jacobian;
                points.push((x, y));
                weights.push(w);
            }
        }

        TriangleRule { points, weights }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}
