//! Heterogeneous mesh/skeleton container.
//!
//! One typed sub-container per concrete kind (elements, interfaces,
//! boundaries, distributed boundaries). Stable indices (`ElementId` etc.),
//! not pointers, cross-reference between containers, so the mesh can be
//! grown freely before [`Mesh::finalize_initialization`] and is frozen
//! against resize afterward.

use swe_io::SolverError;

use crate::element::ElementData;
use crate::master::Master;
use crate::shape::Shape;
use crate::trace::{Boundary, DistributedBoundary, Interface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundaryId(pub usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DistributedBoundaryId(pub usize);

/// The mesh for one simulation unit: a shared master element plus the
/// typed element/interface/boundary/distributed-boundary containers.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub master: Master,
    elements: Vec<ElementData>,
    shapes: Vec<Shape>,
    interfaces: Vec<Interface>,
    boundaries: Vec<Boundary>,
    distributed_boundaries: Vec<DistributedBoundary>,
    frozen: bool,
}

impl Mesh {
    pub fn new(master: Master) -> Self {
        Mesh {
            master,
            elements: Vec::new(),
            shapes: Vec::new(),
            interfaces: Vec::new(),
            boundaries: Vec::new(),
            distributed_boundaries: Vec::new(),
            frozen: false,
        }
    }

    /// Pre-size the typed containers. Only meaningful before
    /// `finalize_initialization`; a reserved `Vec` avoids reallocation
    /// churn during bulk mesh construction.
    pub fn reserve(&mut self, n_elements: usize, n_interfaces: usize, n_boundaries: usize) {
        self.elements.reserve(n_elements);
        self.shapes.reserve(n_elements);
        self.interfaces.reserve(n_interfaces);
        self.boundaries.reserve(n_boundaries);
    }

    fn ensure_not_frozen(&self, what: &str) -> Result<(), SolverError> {
        if self.frozen {
            return Err(SolverError::MeshInconsistent(format!(
                "cannot {what}: mesh is frozen after finalize_initialization"
            )));
        }
        Ok(())
    }

    pub fn create_element(&mut self, data: ElementData, shape: Shape) -> Result<ElementId, SolverError> {
        self.ensure_not_frozen("create_element")?;
        let id = self.elements.len();
        self.elements.push(data);
        self.shapes.push(shape);
        Ok(ElementId(id))
    }

    pub fn create_interface(&mut self, interface: Interface) -> Result<InterfaceId, SolverError> {
        self.ensure_not_frozen("create_interface")?;
        let id = self.interfaces.len();
        self.interfaces.push(interface);
        Ok(InterfaceId(id))
    }

    pub fn create_boundary(&mut self, boundary: Boundary) -> Result<BoundaryId, SolverError> {
        self.ensure_not_frozen("create_boundary")?;
        let id = self.boundaries.len();
        self.boundaries.push(boundary);
        Ok(BoundaryId(id))
    }

    pub fn create_distributed_boundary(
        &mut self,
        boundary: DistributedBoundary,
    ) -> Result<DistributedBoundaryId, SolverError> {
        self.ensure_not_frozen("create_distributed_boundary")?;
        let id = self.distributed_boundaries.len();
        self.distributed_boundaries.push(boundary);
        Ok(DistributedBoundaryId(id))
    }

    /// Freeze the mesh: validates every cross-reference and forbids
    /// further growth. After this call, no reallocation occurs and
    /// indices obtained via the accessor methods remain stable until the
    /// mesh is dropped.
    pub fn finalize_initialization(&mut self) -> Result<(), SolverError> {
        let check_side = |element_id: usize, local_bound_id: usize| -> Result<(), SolverError> {
            let element = self.elements.get(element_id).ok_or_else(|| {
                SolverError::MeshInconsistent(format!("dangling element id {element_id}"))
            })?;
            if local_bound_id >= element.nbound {
                return Err(SolverError::MeshInconsistent(format!(
                    "element {element_id}: local_bound_id {local_bound_id} >= nbound {}",
                    element.nbound
                )));
            }
            Ok(())
        };

        for iface in &self.interfaces {
            check_side(iface.left.element_id, iface.left.local_bound_id)?;
            check_side(iface.right.element_id, iface.right.local_bound_id)?;
        }
        for b in &self.boundaries {
            check_side(b.side.element_id, b.side.local_bound_id)?;
        }
        for db in &self.distributed_boundaries {
            check_side(db.side.element_id, db.side.local_bound_id)?;
        }

        self.elements.shrink_to_fit();
        self.shapes.shrink_to_fit();
        self.interfaces.shrink_to_fit();
        self.boundaries.shrink_to_fit();
        self.distributed_boundaries.shrink_to_fit();
        self.frozen = true;
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }
    pub fn num_interfaces(&self) -> usize {
        self.interfaces.len()
    }
    pub fn num_boundaries(&self) -> usize {
        self.boundaries.len()
    }
    pub fn num_distributed_boundaries(&self) -> usize {
        self.distributed_boundaries.len()
    }

    pub fn get_element(&self, id: ElementId) -> Option<&ElementData> {
        self.elements.get(id.0)
    }
    pub fn get_element_mut(&mut self, id: ElementId) -> Option<&mut ElementData> {
        self.elements.get_mut(id.0)
    }
    pub fn get_shape(&self, id: ElementId) -> Option<&Shape> {
        self.shapes.get(id.0)
    }
    pub fn get_interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces.get(id.0)
    }
    pub fn get_interface_mut(&mut self, id: InterfaceId) -> Option<&mut Interface> {
        self.interfaces.get_mut(id.0)
    }
    pub fn get_boundary(&self, id: BoundaryId) -> Option<&Boundary> {
        self.boundaries.get(id.0)
    }
    pub fn get_boundary_mut(&mut self, id: BoundaryId) -> Option<&mut Boundary> {
        self.boundaries.get_mut(id.0)
    }
    pub fn get_distributed_boundary(&self, id: DistributedBoundaryId) -> Option<&DistributedBoundary> {
        self.distributed_boundaries.get(id.0)
    }
    pub fn get_distributed_boundary_mut(
        &mut self,
        id: DistributedBoundaryId,
    ) -> Option<&mut DistributedBoundary> {
        self.distributed_boundaries.get_mut(id.0)
    }

    pub fn elements(&self) -> &[ElementData] {
        &self.elements
    }
    pub fn elements_mut(&mut self) -> &mut [ElementData] {
        &mut self.elements
    }
    /// Both typed containers at once, for thread-parallel loops that
    /// need each element paired with its shape without re-borrowing
    /// `self` twice.
    pub fn elements_and_shapes_mut(&mut self) -> (&mut [ElementData], &[Shape]) {
        (&mut self.elements, &self.shapes)
    }
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }
    pub fn interfaces_mut(&mut self) -> &mut [Interface] {
        &mut self.interfaces
    }
    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }
    pub fn boundaries_mut(&mut self) -> &mut [Boundary] {
        &mut self.boundaries
    }
    pub fn distributed_boundaries(&self) -> &[DistributedBoundary] {
        &self.distributed_boundaries
    }
    pub fn distributed_boundaries_mut(&mut self) -> &mut [DistributedBoundary] {
        &mut self.distributed_boundaries
    }
}
