use std::env;
use std::path::Path;
use std::process::ExitCode;

use swe_io::{Deck, RunConfig, SolverError};
use swe_model::trace::{Boundary, BoundaryKind, Side};
use swe_model::{EdgeData, ElementData, Master, Mesh, RkTableau, Shape};
use swe_solver::communicator::LocalCommunicator;
use swe_solver::{Environment, Forcing, SimulationDriver, Stepper};

fn usage() {
    eprintln!("usage:");
    eprintln!("  solver <input_file>");
    eprintln!();
    eprintln!("reads a run-configuration deck, validates it, builds the");
    eprintln!("resolved mesh/stepper/driver, and steps the simulation to");
    eprintln!("TEND. Mesh partitioning and forcing-file ingestion are");
    eprintln!("handled by an external preprocessor, not this binary — the");
    eprintln!("mesh built here is a single still-water reference basin.");
}

fn run(input_file: &Path) -> Result<RunConfig, SolverError> {
    let deck = Deck::parse_file(input_file)
        .map_err(|e| SolverError::BadInput(format!("{}: {e}", input_file.display())))?;
    RunConfig::from_deck(&deck)
}

/// Pick the named SSP-RK tableau matching the deck's `*RK` card. The deck
/// format lets a caller name stages and order independently, but this
/// crate only carries three concrete tableaux — anything else is a bad
/// input, not a silent fallback.
fn select_tableau(config: &RunConfig) -> Result<RkTableau, SolverError> {
    match (config.rk_stages, config.rk_order) {
        (1, 1) => Ok(RkTableau::forward_euler()),
        (2, 2) => Ok(RkTableau::ssp_rk2()),
        (3, 3) => Ok(RkTableau::ssp_rk3()),
        (stages, order) => Err(SolverError::BadInput(format!(
            "no RK tableau for NSTAGES={stages}, ORDER={order} (supported: 1/1, 2/2, 3/3)"
        ))),
    }
}

/// Build the single-element, all-land-wall basin this binary steps.
/// `*MESH` still names the external mesh file for downstream tooling to
/// resolve, but this crate carries no mesh-file reader (see
/// `swe_io::config`'s own doc comment) — the bundled basin is the
/// reference mesh every deck resolves to until one is added.
fn build_mesh(config: &RunConfig, nstages: usize) -> Result<Mesh, SolverError> {
    let master = Master::new(config.polynomial_order)?;
    let mut mesh = Mesh::new(master.clone());
    let bathymetry = 5.0;
    let data = ElementData::new(0, master.ndof, master.ngp, master.nbound, nstages, bathymetry)?;
    let shape = Shape::new([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
    let normals: Vec<(f64, f64)> = (0..master.nbound).map(|b| shape.get_surface_normal(b)).collect();
    mesh.create_element(data, shape)?;

    for (bound_id, normal) in normals.into_iter().enumerate() {
        mesh.create_boundary(Boundary {
            id: bound_id,
            side: Side {
                element_id: 0,
                local_bound_id: bound_id,
            },
            normal,
            ngp: master.ngp,
            edge: EdgeData::zeros(master.ngp, master.ngp),
            kind: BoundaryKind::Land,
        })?;
    }
    mesh.finalize_initialization()?;
    Ok(mesh)
}

fn run_simulation(config: &RunConfig) -> Result<(), SolverError> {
    let tableau = select_tableau(config)?;
    let mesh = build_mesh(config, tableau.nstages)?;
    let env = Environment::new(9.80665, 1000.0, config.gn_alpha.unwrap_or(1.0), config.gn_tau, 0.0);
    let stepper = Stepper::new(tableau, config.dt);
    let mut driver = SimulationDriver::new(
        mesh,
        env,
        stepper,
        Forcing {
            toggles: config.forcing,
            ..Forcing::default()
        },
        config.gn_alpha.is_some(),
        0,
        LocalCommunicator::default(),
    );

    while driver.stepper.current_time() < config.t_end {
        driver.run_stage()?;
    }
    tracing::info!(t_end = config.t_end, "simulation complete");
    Ok(())
}

fn print_config(config: &RunConfig) {
    println!("polynomial_order: {}", config.polynomial_order);
    println!("mesh_file: {}", config.mesh_file);
    println!("rk_stages: {}", config.rk_stages);
    println!("rk_order: {}", config.rk_order);
    println!("dt: {}", config.dt);
    println!("t_end: {}", config.t_end);
    println!(
        "forcing: meteo={} tide={} coriolis={} manning={}",
        config.forcing.meteo, config.forcing.tide, config.forcing.coriolis, config.forcing.manning
    );
    if let Some(alpha) = config.gn_alpha {
        println!("dispersive: alpha={} tau={}", alpha, config.gn_tau);
    }
    println!("slope_limit: {}", config.slope_limit);
}

fn main() -> ExitCode {
    swe_io::logging::init_stdout();

    let args: Vec<String> = env::args().collect();
    let input_file = match args.get(1) {
        Some(path) if args.len() == 2 => path,
        _ => {
            usage();
            return ExitCode::from(1);
        }
    };

    let outcome = run(Path::new(input_file)).and_then(|config| {
        print_config(&config);
        run_simulation(&config)
    });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "run aborted");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_path(prefix: &str) -> std::path::PathBuf {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be valid")
            .as_nanos();
        env::temp_dir().join(format!("{prefix}_{pid}_{nanos}.deck"))
    }

    #[test]
    fn run_accepts_a_minimal_valid_deck() {
        let path = unique_temp_path("swe_cli_minimal");
        fs::write(
            &path,
            "*ORDER\n2\n*MESH\nunit_square.mesh\n*RK\nNSTAGES=3,ORDER=3\n*TIMESTEP\nDT=0.01,TEND=10.0\n",
        )
        .unwrap();

        let config = run(&path).expect("well-formed deck should parse");
        assert_eq!(config.polynomial_order, 2);
        assert_eq!(config.rk_stages, 3);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn run_rejects_a_missing_file() {
        let err = run(Path::new("/nonexistent/path/for/swe-cli-test.deck")).unwrap_err();
        assert!(matches!(err, SolverError::BadInput(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn run_simulation_steps_the_still_water_basin_to_rest() {
        let path = unique_temp_path("swe_cli_still_water");
        fs::write(
            &path,
            "*ORDER\n1\n*MESH\nunit_square.mesh\n*RK\nNSTAGES=1,ORDER=1\n*TIMESTEP\nDT=0.01,TEND=0.03\n",
        )
        .unwrap();

        let config = run(&path).expect("well-formed deck should parse");
        run_simulation(&config).expect("still-water basin should step without error");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn run_simulation_rejects_an_unsupported_rk_scheme() {
        let config = RunConfig {
            polynomial_order: 1,
            mesh_file: "unit_square.mesh".into(),
            rk_stages: 4,
            rk_order: 4,
            dt: 0.01,
            t_end: 1.0,
            forcing: swe_io::ForcingToggles::default(),
            gn_alpha: None,
            gn_tau: -20.0,
            slope_limit: false,
        };
        let err = run_simulation(&config).expect_err("no 4-stage tableau is carried");
        assert!(matches!(err, SolverError::BadInput(_)));
    }
}
