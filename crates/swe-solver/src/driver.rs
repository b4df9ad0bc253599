//! Bulk-synchronous per-timestep orchestration.
//!
//! Implements the pipeline as an explicit per-unit state machine rather
//! than a monolithic loop body, so each stage of the fixed ordering
//! (local volume -> local source -> local interface/boundary ->
//! pre-receive edge kernels -> wait_receive -> post-receive distributed
//! edges -> global trace solve -> surface flux integration -> local
//! post-receive -> apply M^-1/RK -> wait_send) is one method the tests
//! can call in isolation.

use std::sync::Mutex;

use rayon::prelude::*;
use swe_io::{ForcingToggles, SolverError};
use swe_model::element::N_VARIABLES;
use swe_model::trace::BoundaryKind;
use swe_model::{boundary_to_master_coordinates, Mesh};

use crate::communicator::{CommType, Communicator, Message, MessageTag};
use crate::environment::Environment;
use crate::kernels::bc::BcSpec;
use crate::kernels::gn::apply_dispersive_correction;
use crate::kernels::swe_global::{boundary_edge_kernel, interface_edge_kernel, populate_edge_trace, solve_edge_trace};
use crate::kernels::swe_local::{
    local_boundary_kernel, local_post_receive_kernel, local_source_kernel, local_surface_kernel, local_volume_kernel,
};
use crate::stepper::Stepper;

/// Per-step physics toggles and coefficients the driver threads through
/// to `local_source_kernel`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forcing {
    pub toggles: ForcingToggles,
    pub manning_n: f64,
    pub coriolis_f: f64,
    pub tidal_potential_grad: (f64, f64),
    pub meteo_stress: (f64, f64),
    pub atm_pressure_grad: (f64, f64),
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "cannot borrow the same element twice");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Edge quadrature points (in reference-element coordinates) and weights
/// for one boundary of a `p`-order master, derived from the 1-D edge rule
/// rather than a separately tabulated set.
fn edge_points_for_bound(bound_id: usize, degree: usize) -> (Vec<(f64, f64)>, Vec<f64>) {
    let (nodes, weights) = swe_model::quadrature::edge_rule(degree);
    let points = nodes
        .into_iter()
        .map(|z| boundary_to_master_coordinates(bound_id, z))
        .collect();
    (points, weights)
}

pub struct SimulationDriver<C: Communicator> {
    pub mesh: Mesh,
    pub env: Environment,
    pub stepper: Stepper,
    pub forcing: Forcing,
    pub enable_gn: bool,
    pub rank: usize,
    communicator: C,
}

impl<C: Communicator> SimulationDriver<C> {
    pub fn new(
        mesh: Mesh,
        env: Environment,
        stepper: Stepper,
        forcing: Forcing,
        enable_gn: bool,
        rank: usize,
        communicator: C,
    ) -> Self {
        SimulationDriver {
            mesh,
            env,
            stepper,
            forcing,
            enable_gn,
            rank,
            communicator,
        }
    }

    /// Local volume + source kernels over every element, thread-parallel
    /// via `par_iter_mut` over the mesh's typed element container.
    fn run_local_kernels(&mut self, stage: usize) -> Result<(), SolverError> {
        let master = self.mesh.master.clone();
        let env = self.env;
        let forcing = self.forcing;
        let error_slot: Mutex<Option<SolverError>> = Mutex::new(None);

        let (elements, shapes) = self.mesh.elements_and_shapes_mut();
        elements
            .par_iter_mut()
            .zip(shapes.par_iter())
            .for_each(|(element, shape)| {
                let result = (|| -> Result<(), SolverError> {
                    local_volume_kernel(&master, shape, &env, element, stage)?;
                    local_source_kernel(
                        &master,
                        shape,
                        &env,
                        element,
                        stage,
                        forcing.manning_n,
                        forcing.coriolis_f,
                        forcing.tidal_potential_grad,
                        forcing.meteo_stress,
                        forcing.atm_pressure_grad,
                        forcing.toggles.coriolis,
                        forcing.toggles.manning,
                        forcing.toggles.meteo,
                        forcing.toggles.tide,
                    )?;
                    for bound_id in 0..element.nbound {
                        let (edge_points, _weights) = edge_points_for_bound(bound_id, master.p + 1);
                        local_boundary_kernel(&master, shape, &env, element, stage, bound_id, &edge_points)?;
                    }
                    Ok(())
                })();
                if let Err(e) = result {
                    *error_slot.lock().unwrap() = Some(e);
                }
            });

        if let Some(e) = error_slot.into_inner().unwrap() {
            return Err(e);
        }
        Ok(())
    }

    /// Interior-interface and domain-boundary global edge kernels, run
    /// before the distributed-boundary exchange so every local trace is
    /// populated first.
    fn run_pre_receive_edge_kernels(&mut self, time: f64) -> Result<(), SolverError> {
        let env = self.env;
        let n_interfaces = self.mesh.num_interfaces();
        for i in 0..n_interfaces {
            let iface = self.mesh.interfaces()[i].clone();
            let (left, right) = pair_mut(self.mesh.elements_mut(), iface.left.element_id, iface.right.element_id);
            interface_edge_kernel(&env, &iface, left, right)?;
        }

        let n_boundaries = self.mesh.num_boundaries();
        for i in 0..n_boundaries {
            let boundary = self.mesh.boundaries()[i].clone();
            let element = self
                .mesh
                .elements_mut()
                .get_mut(boundary.side.element_id)
                .ok_or_else(|| SolverError::MeshInconsistent("dangling boundary element".into()))?;
            match &boundary.kind {
                BoundaryKind::Land => {
                    boundary_edge_kernel(&env, time, &BcSpec::Land, &boundary, element)?;
                }
                BoundaryKind::Tide { constituents } => {
                    boundary_edge_kernel(&env, time, &BcSpec::Tide(constituents), &boundary, element)?;
                }
                BoundaryKind::Function { .. } => {
                    // Prescribed-state closures are registered by the caller
                    // out of band (they cannot live in plain mesh data);
                    // the default driver path treats an unregistered
                    // function boundary as reflective.
                    boundary_edge_kernel(&env, time, &BcSpec::Land, &boundary, element)?;
                }
            }
        }
        Ok(())
    }

    /// Exchange distributed-boundary traces: pack `q_at_gp` into each
    /// edge's own `Exchanger::send_buffer`, advance its `CommTag`
    /// sequence (which must track the stepper's per-stage timestamp,
    /// or the exchange has drifted out of order), post the send, then
    /// block on the matching receive, land the reply in `recv_buffer`,
    /// and combine via LLF exactly as an interior interface would.
    fn exchange_distributed_boundaries(&mut self, timestamp: u64) -> Result<(), SolverError> {
        let env = self.env;
        let n = self.mesh.num_distributed_boundaries();
        if n == 0 {
            return Ok(());
        }

        let tag = MessageTag {
            comm_type: CommType::BoundState,
            timestamp,
        };

        let mut outgoing = Vec::with_capacity(n);
        for i in 0..n {
            let (id, peer_rank, element_id, local_bound_id) = {
                let db = &self.mesh.distributed_boundaries()[i];
                (db.id, db.peer_rank, db.side.element_id, db.side.local_bound_id)
            };
            let payload_len = {
                let element = self
                    .mesh
                    .get_element(swe_model::ElementId(element_id))
                    .ok_or_else(|| SolverError::MeshInconsistent("dangling distributed boundary element".into()))?;
                N_VARIABLES * element.boundary[local_bound_id].q_at_gp.ncols()
            };

            let db_mut = self
                .mesh
                .get_distributed_boundary_mut(swe_model::DistributedBoundaryId(i))
                .ok_or_else(|| SolverError::MeshInconsistent("dangling distributed boundary".into()))?;
            if db_mut.exchanger.send_buffer.len() != payload_len {
                db_mut.exchanger.send_buffer = vec![0.0; payload_len];
                db_mut.exchanger.recv_buffer = vec![0.0; payload_len];
            }
            let q_at_gp = {
                let element = self
                    .mesh
                    .get_element(swe_model::ElementId(element_id))
                    .ok_or_else(|| SolverError::MeshInconsistent("dangling distributed boundary element".into()))?;
                element.boundary[local_bound_id].q_at_gp.clone()
            };
            {
                let db_mut = self
                    .mesh
                    .get_distributed_boundary_mut(swe_model::DistributedBoundaryId(i))
                    .unwrap();
                for gp in 0..q_at_gp.ncols() {
                    for v in 0..N_VARIABLES {
                        db_mut.exchanger.send_buffer[gp * N_VARIABLES + v] = q_at_gp[(v, gp)];
                    }
                }
            }

            let db_mut = self
                .mesh
                .get_distributed_boundary_mut(swe_model::DistributedBoundaryId(i))
                .unwrap();
            let seq_tag = db_mut.exchanger.advance_sequence(peer_rank, id);
            if seq_tag.sequence != timestamp {
                return Err(SolverError::CommunicatorFailure(format!(
                    "distributed edge {id}: exchange sequence {} diverged from stepper timestamp {timestamp}",
                    seq_tag.sequence
                )));
            }

            outgoing.push(Message {
                peer_rank,
                local_edge_id: id,
                tag,
                payload: db_mut.exchanger.send_buffer.clone(),
            });
        }
        self.communicator.send_all(outgoing)?;
        self.communicator.wait_all_sends()?;
        let incoming = self.communicator.wait_all_receives(tag)?;

        for msg in incoming {
            let db_idx = msg.local_edge_id;
            let db_mut = self
                .mesh
                .get_distributed_boundary_mut(swe_model::DistributedBoundaryId(db_idx))
                .ok_or_else(|| SolverError::CommunicatorFailure(format!("unknown distributed edge {db_idx}")))?;
            if db_mut.exchanger.recv_buffer.len() != msg.payload.len() {
                db_mut.exchanger.recv_buffer = vec![0.0; msg.payload.len()];
            }
            db_mut.exchanger.recv_buffer.copy_from_slice(&msg.payload);
            let element_id = db_mut.side.element_id;
            let local_bound_id = db_mut.side.local_bound_id;
            let normal = db_mut.normal;
            let recv = db_mut.exchanger.recv_buffer.clone();

            let element = self
                .mesh
                .get_element_mut(swe_model::ElementId(element_id))
                .ok_or_else(|| SolverError::MeshInconsistent("dangling distributed boundary element".into()))?;
            let bath = element.bathymetry;
            let trace = &mut element.boundary[local_bound_id];
            let ngp = trace.q_at_gp.ncols();
            for gp in 0..ngp {
                let q_in = [
                    trace.q_at_gp[(0, gp)],
                    trace.q_at_gp[(1, gp)],
                    trace.q_at_gp[(2, gp)],
                ];
                let q_ex = [
                    recv[gp * N_VARIABLES],
                    recv[gp * N_VARIABLES + 1],
                    recv[gp * N_VARIABLES + 2],
                ];
                let f_hat = crate::kernels::bc::llf_flux(&env, q_in, q_ex, bath, normal);
                for v in 0..N_VARIABLES {
                    trace.f_hat_at_gp[(v, gp)] = f_hat[v];
                }
            }
        }
        Ok(())
    }

    /// Integrate each element's final `f_hat_at_gp` (interior interface,
    /// domain boundary, or distributed boundary — whichever populated it
    /// last) against the edge basis and surface Jacobian, subtracting the
    /// result into `rhs`. Must run after every edge kernel above and
    /// before `run_post_receive_and_advance` scales `rhs` by `M^-1`.
    fn run_surface_kernels(&mut self, stage: usize) -> Result<(), SolverError> {
        let master = self.mesh.master.clone();
        let (elements, shapes) = self.mesh.elements_and_shapes_mut();
        for (element, shape) in elements.iter_mut().zip(shapes.iter()) {
            for bound_id in 0..element.nbound {
                let (edge_points, edge_weights) = edge_points_for_bound(bound_id, master.p + 1);
                local_surface_kernel(&master, shape, element, stage, bound_id, &edge_points, &edge_weights);
            }
        }
        Ok(())
    }

    /// Global trace solve: populate every interface/boundary/distributed-
    /// boundary's `EdgeData` from the final `f_hat_at_gp` and the trace
    /// state its sides agree on, then solve each edge's block (EHDG: no
    /// cross-edge coupling) and scatter the result back into `q_hat`.
    fn run_trace_solve(&mut self) -> Result<(), SolverError> {
        let stabilization = self.env.tau;

        let n_interfaces = self.mesh.num_interfaces();
        for i in 0..n_interfaces {
            let iface = self.mesh.interfaces()[i].clone();
            let (q_hat_at_gp, aux_hat_at_gp, f_hat) = {
                let left = self
                    .mesh
                    .get_element(swe_model::ElementId(iface.left.element_id))
                    .ok_or_else(|| SolverError::MeshInconsistent("dangling interface element".into()))?;
                let right = self
                    .mesh
                    .get_element(swe_model::ElementId(iface.right.element_id))
                    .ok_or_else(|| SolverError::MeshInconsistent("dangling interface element".into()))?;
                let left_trace = &left.boundary[iface.left.local_bound_id];
                let right_trace = &right.boundary[iface.right.local_bound_id];
                let mut q_hat_at_gp = left_trace.q_at_gp.clone();
                let mut aux_hat_at_gp = left_trace.aux_at_gp.clone();
                for gp in 0..iface.ngp {
                    let gp_r = iface.reversed_gp_index(gp);
                    for v in 0..N_VARIABLES {
                        q_hat_at_gp[(v, gp)] = 0.5 * (left_trace.q_at_gp[(v, gp)] + right_trace.q_at_gp[(v, gp_r)]);
                    }
                    for a in 0..swe_model::element::N_AUX {
                        aux_hat_at_gp[(a, gp)] =
                            0.5 * (left_trace.aux_at_gp[(a, gp)] + right_trace.aux_at_gp[(a, gp_r)]);
                    }
                }
                (q_hat_at_gp, aux_hat_at_gp, left_trace.f_hat_at_gp.clone())
            };
            let iface_mut = self.mesh.get_interface_mut(swe_model::InterfaceId(i)).unwrap();
            populate_edge_trace(&mut iface_mut.edge, &q_hat_at_gp, &aux_hat_at_gp, &f_hat, stabilization);
            solve_edge_trace(&mut iface_mut.edge)?;
        }

        let n_boundaries = self.mesh.num_boundaries();
        for i in 0..n_boundaries {
            let boundary = self.mesh.boundaries()[i].clone();
            let (q_hat_at_gp, aux_hat_at_gp, f_hat) = {
                let element = self
                    .mesh
                    .get_element(swe_model::ElementId(boundary.side.element_id))
                    .ok_or_else(|| SolverError::MeshInconsistent("dangling boundary element".into()))?;
                let trace = &element.boundary[boundary.side.local_bound_id];
                (trace.q_at_gp.clone(), trace.aux_at_gp.clone(), trace.f_hat_at_gp.clone())
            };
            let boundary_mut = self.mesh.get_boundary_mut(swe_model::BoundaryId(i)).unwrap();
            populate_edge_trace(&mut boundary_mut.edge, &q_hat_at_gp, &aux_hat_at_gp, &f_hat, stabilization);
            solve_edge_trace(&mut boundary_mut.edge)?;
        }

        let n_distributed = self.mesh.num_distributed_boundaries();
        for i in 0..n_distributed {
            let db = self.mesh.distributed_boundaries()[i].clone();
            let (q_hat_at_gp, aux_hat_at_gp, f_hat) = {
                let element = self
                    .mesh
                    .get_element(swe_model::ElementId(db.side.element_id))
                    .ok_or_else(|| SolverError::MeshInconsistent("dangling distributed boundary element".into()))?;
                let trace = &element.boundary[db.side.local_bound_id];
                (trace.q_at_gp.clone(), trace.aux_at_gp.clone(), trace.f_hat_at_gp.clone())
            };
            let db_mut = self
                .mesh
                .get_distributed_boundary_mut(swe_model::DistributedBoundaryId(i))
                .unwrap();
            populate_edge_trace(&mut db_mut.edge, &q_hat_at_gp, &aux_hat_at_gp, &f_hat, stabilization);
            solve_edge_trace(&mut db_mut.edge)?;
        }
        Ok(())
    }

    /// Local post-receive kernel, optional GN dispersive correction, and
    /// RK state update for every element.
    fn run_post_receive_and_advance(&mut self, stage: usize) -> Result<(), SolverError> {
        let master = self.mesh.master.clone();
        let tableau = self.stepper.tableau().clone();
        let dt = self.stepper.get_dt();
        let env = self.env;
        let enable_gn = self.enable_gn;

        for element in self.mesh.elements_mut() {
            if enable_gn {
                apply_dispersive_correction(&env, element, stage + 1)?;
            }
            local_post_receive_kernel(&master, element, &tableau, stage, dt);
        }
        Ok(())
    }

    /// Optional NaN scrutiny: fatal, surfaced so the caller can convert
    /// it into a collective abort.
    fn scrutinize_for_nan(&self) -> Result<(), SolverError> {
        for element in self.mesh.elements() {
            if element.has_nan() {
                return Err(SolverError::NumericalInstability(format!(
                    "NaN detected in element {} state",
                    element.id
                )));
            }
        }
        Ok(())
    }

    /// Run one full stage of the pipeline in its fixed order, then
    /// advance the stepper.
    pub fn run_stage(&mut self) -> Result<(), SolverError> {
        let stage = self.stepper.get_stage();
        let time = self.stepper.get_time_at_current_stage();
        let timestamp = self.stepper.get_timestamp();

        self.run_local_kernels(stage)?;
        self.run_pre_receive_edge_kernels(time)?;
        self.exchange_distributed_boundaries(timestamp)?;
        self.run_trace_solve()?;
        self.run_surface_kernels(stage)?;
        self.run_post_receive_and_advance(stage)?;
        self.scrutinize_for_nan()?;

        for element in self.mesh.elements_mut() {
            if self.stepper.get_stage() + 1 == self.stepper.num_stages() {
                element.rotate_stage();
            }
        }
        self.stepper.advance_stage();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swe_model::trace::Side;
    use swe_model::{Boundary, Master, RkTableau, Shape};

    fn still_water_mesh() -> Mesh {
        let master = Master::new(1).unwrap();
        let mut mesh = Mesh::new(master.clone());
        let data = swe_model::ElementData::new(0, master.ndof, master.ngp, master.nbound, 1, 5.0).unwrap();
        let shape = Shape::new([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        mesh.create_element(data, shape).unwrap();
        for bound_id in 0..master.nbound {
            mesh.create_boundary(Boundary {
                id: bound_id,
                side: Side {
                    element_id: 0,
                    local_bound_id: bound_id,
                },
                normal: (1.0, 0.0),
                ngp: master.ngp,
                edge: swe_model::EdgeData::zeros(master.ngp, master.ngp),
                kind: BoundaryKind::Land,
            })
            .unwrap();
        }
        mesh.finalize_initialization().unwrap();
        mesh
    }

    #[test]
    fn surface_kernel_integrates_boundary_flux_into_rhs() {
        let mut mesh = still_water_mesh();
        for element in mesh.elements_mut() {
            for gp in 0..element.boundary[0].f_hat_at_gp.ncols() {
                element.boundary[0].f_hat_at_gp[(0, gp)] = 1.0;
            }
        }
        let env = Environment::default();
        let stepper = Stepper::new(RkTableau::forward_euler(), 0.01);
        let mut driver = SimulationDriver::new(
            mesh,
            env,
            stepper,
            Forcing::default(),
            false,
            0,
            crate::communicator::LocalCommunicator::default(),
        );

        driver.run_surface_kernels(0).unwrap();

        let element = &driver.mesh.elements()[0];
        assert!(
            element.state[1].rhs.row(0).iter().any(|v| v.abs() > 1e-9),
            "a nonzero boundary flux should reach rhs through surface integration"
        );
    }

    #[test]
    fn distributed_exchange_rejects_sequence_drifted_from_stepper_timestamp() {
        use swe_model::trace::{DistributedBoundary, Exchanger};

        let master = Master::new(1).unwrap();
        let mut mesh = Mesh::new(master.clone());
        let data = swe_model::ElementData::new(0, master.ndof, master.ngp, master.nbound, 1, 5.0).unwrap();
        let shape = Shape::new([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        mesh.create_element(data, shape).unwrap();
        mesh.create_distributed_boundary(DistributedBoundary {
            id: 0,
            side: Side {
                element_id: 0,
                local_bound_id: 0,
            },
            normal: (1.0, 0.0),
            ngp: master.ngp,
            edge: swe_model::EdgeData::zeros(master.ngp, master.ngp),
            peer_rank: 1,
            exchanger: Exchanger::default(),
        })
        .unwrap();
        mesh.finalize_initialization().unwrap();

        let env = Environment::default();
        let stepper = Stepper::new(RkTableau::forward_euler(), 0.01);
        let mut driver = SimulationDriver::new(
            mesh,
            env,
            stepper,
            Forcing::default(),
            false,
            0,
            crate::communicator::LocalCommunicator::default(),
        );

        // Two exchanges in step with the stepper's per-stage timestamp
        // advance the exchanger's own sequence counter in lockstep.
        driver.exchange_distributed_boundaries(0).unwrap();
        driver.exchange_distributed_boundaries(1).unwrap();

        // A third exchange that skips ahead to timestamp 5 leaves the
        // exchanger's sequence (now 2) behind it — the drift the
        // invariant exists to catch.
        let err = driver
            .exchange_distributed_boundaries(5)
            .expect_err("drifted sequence should be rejected");
        assert!(matches!(err, SolverError::CommunicatorFailure(_)));
    }

    #[test]
    fn still_water_with_land_walls_stays_at_rest() {
        use crate::communicator::LocalCommunicator;

        let mesh = still_water_mesh();
        let env = Environment::default();
        let stepper = Stepper::new(RkTableau::forward_euler(), 0.01);
        let mut driver = SimulationDriver::new(
            mesh,
            env,
            stepper,
            Forcing::default(),
            false,
            0,
            LocalCommunicator::default(),
        );

        driver.run_stage().unwrap();

        for element in driver.mesh.elements() {
            for v in 0..N_VARIABLES {
                for i in 0..element.ndof {
                    assert!(
                        element.state[0].q[(v, i)].abs() < 1e-8,
                        "still water should remain at rest: q[{v}][{i}] = {}",
                        element.state[0].q[(v, i)]
                    );
                }
            }
        }
    }
}
