//! Position-based soft body built from a render mesh.
//!
//! Nodes are the unique vertex positions of the mesh; split render vertices
//! (UV seams, hard edges) map back onto a shared node. Every unique triangle
//! edge becomes a stretch link, and node pairs up to `bending_distance` hops
//! apart in the edge graph get bending links. All state is kept in physics
//! units.

use std::collections::{BTreeSet, HashMap, VecDeque};

use glam::{Affine3A, Vec3, Vec4};
use impulse_core::mesh::{Bounds, DeformableMesh};

use crate::units::{to_physics, to_system, PHYSICS_UNIT_TO_SYSTEM_UNIT, SYSTEM_UNIT_TO_PHYSICS_UNIT};

// ---------------------------------------------------------------------------
// SoftBodyDesc
// ---------------------------------------------------------------------------

/// Soft-body specific creation parameters. Lengths are in system units.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftBodyDesc {
    /// Render-mesh vertex positions in the entity's local space.
    pub positions: Vec<Vec3>,
    /// Triangle list into `positions`.
    pub indices: Vec<u32>,
    /// Constraint iterations per substep.
    pub iterations: u32,
    /// Stretch stiffness in `[0, 1]`.
    pub linear_stiffness: f32,
    /// Bending stiffness in `[0, 1]`.
    pub bending_stiffness: f32,
    /// Longest edge-graph distance that gets a bending link. Below 2 there
    /// are no bending links.
    pub bending_distance: u32,
    pub self_collision: bool,
    /// Collision margin around every node.
    pub thickness: f32,
    /// Render vertices fixed in place.
    pub pinned: Vec<usize>,
    pub wind_velocity: Vec3,
    /// Aerodynamic drag coefficient, per second.
    pub drag: f32,
    /// Velocity damping in `[0, 1]`, per second.
    pub damping: f32,
    /// Collision friction in `[0, 1]`.
    pub friction: f32,
}

impl Default for SoftBodyDesc {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            indices: Vec::new(),
            iterations: 4,
            linear_stiffness: 1.0,
            bending_stiffness: 0.5,
            bending_distance: 2,
            self_collision: false,
            thickness: 1.0,
            pinned: Vec::new(),
            wind_velocity: Vec3::ZERO,
            drag: 0.0,
            damping: 0.01,
            friction: 0.2,
        }
    }
}

impl SoftBodyDesc {
    pub fn from_mesh(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// SoftBody
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Link {
    a: usize,
    b: usize,
    rest: f32,
    bending: bool,
}

/// Result of pushing a node out of world geometry: corrected position and
/// the contact normal.
pub(crate) type NodeCollision = Option<(Vec3, Vec3)>;

#[derive(Debug, Clone)]
pub struct SoftBody {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    forces: Vec<Vec3>,
    inv_masses: Vec<f32>,
    links: Vec<Link>,
    triangles: Vec<[u32; 3]>,
    vertex_to_node: Vec<usize>,
    iterations: u32,
    linear_stiffness: f32,
    bending_stiffness: f32,
    self_collision: bool,
    thickness: f32,
    wind_velocity: Vec3,
    drag: f32,
    damping: f32,
    friction: f32,
}

/// Exact-position key used to weld split render vertices.
fn weld_key(p: Vec3) -> [u32; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl SoftBody {
    /// Build nodes and links from `desc`, placing the mesh with
    /// `local_to_world`. `mass` is spread evenly over the free nodes.
    pub fn new(desc: &SoftBodyDesc, local_to_world: Affine3A, mass: f32) -> Self {
        let mut node_of_key = HashMap::new();
        let mut positions = Vec::new();
        let mut vertex_to_node = Vec::with_capacity(desc.positions.len());
        for &p in &desc.positions {
            let node = *node_of_key.entry(weld_key(p)).or_insert_with(|| {
                let world = local_to_world.transform_point3(p);
                positions.push(world * SYSTEM_UNIT_TO_PHYSICS_UNIT);
                positions.len() - 1
            });
            vertex_to_node.push(node);
        }

        let triangles: Vec<[u32; 3]> = desc
            .indices
            .chunks_exact(3)
            .filter(|t| t.iter().all(|&i| (i as usize) < desc.positions.len()))
            .map(|t| [t[0], t[1], t[2]])
            .collect();

        let n = positions.len();
        let mut inv_masses = vec![0.0; n];
        let mut pinned = vec![false; n];
        for &vertex in &desc.pinned {
            if let Some(&node) = vertex_to_node.get(vertex) {
                pinned[node] = true;
            }
        }
        let free = pinned.iter().filter(|p| !**p).count();
        if free > 0 && mass > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let inv = free as f32 / mass;
            for (w, is_pinned) in inv_masses.iter_mut().zip(&pinned) {
                if !is_pinned {
                    *w = inv;
                }
            }
        }

        let mut body = Self {
            velocities: vec![Vec3::ZERO; n],
            forces: vec![Vec3::ZERO; n],
            positions,
            inv_masses,
            links: Vec::new(),
            triangles,
            vertex_to_node,
            iterations: desc.iterations.max(1),
            linear_stiffness: desc.linear_stiffness.clamp(0.0, 1.0),
            bending_stiffness: desc.bending_stiffness.clamp(0.0, 1.0),
            self_collision: desc.self_collision,
            thickness: to_physics(desc.thickness.max(0.0)),
            wind_velocity: desc.wind_velocity * SYSTEM_UNIT_TO_PHYSICS_UNIT,
            drag: desc.drag.max(0.0),
            damping: desc.damping.clamp(0.0, 1.0),
            friction: desc.friction.clamp(0.0, 1.0),
        };
        body.build_links(desc.bending_distance);
        body
    }

    fn build_links(&mut self, bending_distance: u32) {
        let n = self.positions.len();
        let mut edges = BTreeSet::new();
        for t in &self.triangles {
            let [a, b, c] = t.map(|i| self.vertex_to_node[i as usize]);
            for (i, j) in [(a, b), (b, c), (c, a)] {
                if i != j {
                    edges.insert(ordered(i, j));
                }
            }
        }

        let mut adjacency = vec![Vec::new(); n];
        for &(a, b) in &edges {
            adjacency[a].push(b);
            adjacency[b].push(a);
            self.links.push(Link {
                a,
                b,
                rest: self.positions[a].distance(self.positions[b]),
                bending: false,
            });
        }

        if bending_distance < 2 {
            return;
        }
        // Breadth-first search from every node, bounded by the bending
        // distance. Pairs are emitted once, from their lower index.
        let mut depth = vec![u32::MAX; n];
        let mut queue = VecDeque::new();
        for start in 0..n {
            let mut visited = vec![start];
            depth[start] = 0;
            queue.push_back(start);
            while let Some(node) = queue.pop_front() {
                if depth[node] == bending_distance {
                    continue;
                }
                for &next in &adjacency[node] {
                    if depth[next] == u32::MAX {
                        depth[next] = depth[node] + 1;
                        visited.push(next);
                        queue.push_back(next);
                        if depth[next] >= 2 && next > start {
                            self.links.push(Link {
                                a: start,
                                b: next,
                                rest: self.positions[start].distance(self.positions[next]),
                                bending: true,
                            });
                        }
                    }
                }
            }
            for v in visited {
                depth[v] = u32::MAX;
            }
        }
    }

    // ---- Topology ----

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of stretch links (unique triangle edges).
    pub fn link_count(&self) -> usize {
        self.links.iter().filter(|l| !l.bending).count()
    }

    pub fn bending_link_count(&self) -> usize {
        self.links.iter().filter(|l| l.bending).count()
    }

    /// Node driving render vertex `vertex`.
    pub fn node_of_vertex(&self, vertex: usize) -> Option<usize> {
        self.vertex_to_node.get(vertex).copied()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_to_node.len()
    }

    // ---- Nodes ----

    pub fn node_position(&self, node: usize) -> Option<Vec3> {
        self.positions.get(node).map(|p| *p * PHYSICS_UNIT_TO_SYSTEM_UNIT)
    }

    pub fn set_node_position(&mut self, node: usize, position: Vec3) -> bool {
        match self.positions.get_mut(node) {
            Some(p) => {
                *p = position * SYSTEM_UNIT_TO_PHYSICS_UNIT;
                self.velocities[node] = Vec3::ZERO;
                true
            }
            None => false,
        }
    }

    pub fn node_velocity(&self, node: usize) -> Option<Vec3> {
        self.velocities.get(node).map(|v| *v * PHYSICS_UNIT_TO_SYSTEM_UNIT)
    }

    /// Node mass; zero for pinned nodes.
    pub fn node_mass(&self, node: usize) -> Option<f32> {
        self.inv_masses
            .get(node)
            .map(|&w| if w > 0.0 { 1.0 / w } else { 0.0 })
    }

    /// A non-positive mass pins the node.
    pub fn set_node_mass(&mut self, node: usize, mass: f32) -> bool {
        match self.inv_masses.get_mut(node) {
            Some(w) => {
                *w = if mass > 0.0 { 1.0 / mass } else { 0.0 };
                true
            }
            None => false,
        }
    }

    pub fn total_mass(&self) -> f32 {
        self.inv_masses
            .iter()
            .filter(|w| **w > 0.0)
            .map(|w| 1.0 / w)
            .sum()
    }

    pub fn is_pinned(&self, node: usize) -> bool {
        self.inv_masses.get(node).is_some_and(|w| *w == 0.0)
    }

    /// Force on one node for the next substep, in system units.
    pub fn add_node_force(&mut self, node: usize, force: Vec3) -> bool {
        match self.forces.get_mut(node) {
            Some(f) => {
                *f += force * SYSTEM_UNIT_TO_PHYSICS_UNIT;
                true
            }
            None => false,
        }
    }

    /// Same force on every node for the next substep.
    pub fn add_force(&mut self, force: Vec3) {
        let f = force * SYSTEM_UNIT_TO_PHYSICS_UNIT;
        for acc in &mut self.forces {
            *acc += f;
        }
    }

    pub fn wind_velocity(&self) -> Vec3 {
        self.wind_velocity * PHYSICS_UNIT_TO_SYSTEM_UNIT
    }

    pub fn set_wind_velocity(&mut self, wind: Vec3) {
        self.wind_velocity = wind * SYSTEM_UNIT_TO_PHYSICS_UNIT;
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations.max(1);
    }

    pub fn linear_stiffness(&self) -> f32 {
        self.linear_stiffness
    }

    pub fn set_linear_stiffness(&mut self, k: f32) {
        self.linear_stiffness = k.clamp(0.0, 1.0);
    }

    pub fn bending_stiffness(&self) -> f32 {
        self.bending_stiffness
    }

    pub fn set_bending_stiffness(&mut self, k: f32) {
        self.bending_stiffness = k.clamp(0.0, 1.0);
    }

    pub fn self_collision(&self) -> bool {
        self.self_collision
    }

    pub fn set_self_collision(&mut self, enabled: bool) {
        self.self_collision = enabled;
    }

    pub fn thickness(&self) -> f32 {
        to_system(self.thickness)
    }

    pub fn set_thickness(&mut self, thickness: f32) {
        self.thickness = to_physics(thickness.max(0.0));
    }

    pub fn drag(&self) -> f32 {
        self.drag
    }

    pub fn set_drag(&mut self, drag: f32) {
        self.drag = drag.max(0.0);
    }

    /// Mean node position in system units.
    pub fn center(&self) -> Vec3 {
        if self.positions.is_empty() {
            return Vec3::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.positions.len() as f32;
        self.positions.iter().copied().sum::<Vec3>() / n * PHYSICS_UNIT_TO_SYSTEM_UNIT
    }

    /// Rigidly move every node.
    pub fn translate(&mut self, offset: Vec3) {
        let d = offset * SYSTEM_UNIT_TO_PHYSICS_UNIT;
        for p in &mut self.positions {
            *p += d;
        }
    }

    pub fn clear_velocities(&mut self) {
        self.velocities.fill(Vec3::ZERO);
    }

    /// Node bounds grown by the thickness, in system units.
    pub fn world_aabb(&self) -> Bounds {
        let mut bounds = Bounds::EMPTY;
        for p in &self.positions {
            bounds.add_point(*p * PHYSICS_UNIT_TO_SYSTEM_UNIT);
        }
        if bounds.is_empty() {
            bounds
        } else {
            bounds.expanded(to_system(self.thickness))
        }
    }

    // ---- Simulation ----

    /// Advance one substep. `gravity` is in physics units; `collide` gets a
    /// node position and the thickness and returns a corrected position and
    /// contact normal when the node touches world geometry.
    pub(crate) fn step(
        &mut self,
        dt: f32,
        gravity: Vec3,
        collide: &mut dyn FnMut(Vec3, f32) -> NodeCollision,
    ) {
        if dt <= 0.0 || self.positions.is_empty() {
            return;
        }
        let previous = self.positions.clone();
        let keep = (1.0 - self.damping * dt).max(0.0);

        for i in 0..self.positions.len() {
            let w = self.inv_masses[i];
            if w == 0.0 {
                self.velocities[i] = Vec3::ZERO;
                continue;
            }
            let drag = (self.wind_velocity - self.velocities[i]) * self.drag;
            let accel = gravity + drag + self.forces[i] * w;
            self.velocities[i] = (self.velocities[i] + accel * dt) * keep;
            self.positions[i] += self.velocities[i] * dt;
        }
        self.forces.fill(Vec3::ZERO);

        for _ in 0..self.iterations {
            self.solve_links();
            if self.self_collision {
                self.solve_self_collision();
            }
        }

        for i in 0..self.positions.len() {
            if self.inv_masses[i] == 0.0 {
                continue;
            }
            let mut velocity = (self.positions[i] - previous[i]) / dt;
            if let Some((corrected, normal)) = collide(self.positions[i], self.thickness) {
                self.positions[i] = corrected;
                let along = velocity.dot(normal);
                let tangential = velocity - normal * along;
                velocity = tangential * (1.0 - self.friction) + normal * along.max(0.0);
            }
            self.velocities[i] = velocity;
        }
    }

    fn solve_links(&mut self) {
        for link in &self.links {
            let stiffness = if link.bending {
                self.bending_stiffness
            } else {
                self.linear_stiffness
            };
            let (wa, wb) = (self.inv_masses[link.a], self.inv_masses[link.b]);
            let w_sum = wa + wb;
            if w_sum == 0.0 || stiffness == 0.0 {
                continue;
            }
            let delta = self.positions[link.b] - self.positions[link.a];
            let dist = delta.length();
            if dist <= f32::EPSILON {
                continue;
            }
            let correction = delta * ((dist - link.rest) / (dist * w_sum) * stiffness);
            self.positions[link.a] += correction * wa;
            self.positions[link.b] -= correction * wb;
        }
    }

    /// Push apart unlinked nodes closer than twice the thickness.
    #[allow(clippy::cast_possible_truncation)]
    fn solve_self_collision(&mut self) {
        let min_dist = self.thickness * 2.0;
        if min_dist <= 0.0 {
            return;
        }
        let cell = |p: Vec3| {
            let c = (p / min_dist).floor();
            (c.x as i32, c.y as i32, c.z as i32)
        };
        let mut grid: HashMap<(i32, i32, i32), Vec<usize>> = HashMap::new();
        for (i, p) in self.positions.iter().enumerate() {
            grid.entry(cell(*p)).or_default().push(i);
        }
        let linked: BTreeSet<(usize, usize)> = self
            .links
            .iter()
            .filter(|l| !l.bending)
            .map(|l| ordered(l.a, l.b))
            .collect();

        for i in 0..self.positions.len() {
            let (cx, cy, cz) = cell(self.positions[i]);
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let Some(bucket) = grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                            continue;
                        };
                        for &j in bucket {
                            if j <= i || linked.contains(&(i, j)) {
                                continue;
                            }
                            let (wi, wj) = (self.inv_masses[i], self.inv_masses[j]);
                            let w_sum = wi + wj;
                            let delta = self.positions[j] - self.positions[i];
                            let dist = delta.length();
                            if w_sum == 0.0 || dist >= min_dist || dist <= f32::EPSILON {
                                continue;
                            }
                            let correction = delta * ((min_dist - dist) / (dist * w_sum));
                            self.positions[i] -= correction * wi;
                            self.positions[j] += correction * wj;
                        }
                    }
                }
            }
        }
    }

    // ---- Mesh write-back ----

    /// Write node positions into `mesh` in entity-local space, recompute
    /// normals and tangents, and refit its bounds from the world AABB.
    /// Returns `false` when the vertex counts disagree.
    pub fn write_to_mesh(&self, world_to_local: Affine3A, mesh: &mut dyn DeformableMesh) -> bool {
        if mesh.vertex_count() != self.vertex_to_node.len() {
            tracing::warn!(
                mesh = mesh.vertex_count(),
                soft_body = self.vertex_to_node.len(),
                "soft body and mesh vertex counts differ"
            );
            return false;
        }

        let positions: Vec<Vec3> = self
            .vertex_to_node
            .iter()
            .map(|&node| {
                world_to_local
                    .transform_point3(self.positions[node] * PHYSICS_UNIT_TO_SYSTEM_UNIT)
            })
            .collect();

        let mut normals = vec![Vec3::ZERO; positions.len()];
        let mut tangents = vec![Vec3::ZERO; positions.len()];
        for t in &self.triangles {
            let [a, b, c] = t.map(|i| i as usize);
            let e1 = positions[b] - positions[a];
            let e2 = positions[c] - positions[a];
            let face = e1.cross(e2);
            for v in [a, b, c] {
                normals[v] += face;
                tangents[v] += e1;
            }
        }
        // Welded vertices share one smooth normal.
        let mut node_normals = vec![Vec3::ZERO; self.positions.len()];
        for (v, &node) in self.vertex_to_node.iter().enumerate() {
            node_normals[node] += normals[v];
        }
        let normals: Vec<Vec3> = self
            .vertex_to_node
            .iter()
            .map(|&node| node_normals[node].normalize_or(Vec3::Z))
            .collect();
        let tangents: Vec<Vec4> = tangents
            .iter()
            .zip(&normals)
            .map(|(t, n)| {
                let ortho = (*t - *n * n.dot(*t)).normalize_or(n.any_orthonormal_vector());
                ortho.extend(1.0)
            })
            .collect();

        mesh.write_vertices(&positions, &normals, &tangents);

        let world = self.world_aabb();
        if !world.is_empty() {
            let mut local = Bounds::EMPTY;
            for x in [world.min.x, world.max.x] {
                for y in [world.min.y, world.max.y] {
                    for z in [world.min.z, world.max.z] {
                        local.add_point(world_to_local.transform_point3(Vec3::new(x, y, z)));
                    }
                }
            }
            mesh.set_bounds(local);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use impulse_core::mesh::TriMesh;

    fn grid_desc(n: u32) -> SoftBodyDesc {
        let mesh = TriMesh::grid("cloth", 100.0, 100.0, n, n);
        SoftBodyDesc::from_mesh(mesh.positions(), mesh.indices())
    }

    fn no_world(_: Vec3, _: f32) -> NodeCollision {
        None
    }

    // ---- Topology ----

    #[test]
    fn single_quad_topology() {
        let desc = SoftBodyDesc::from_mesh(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE.with_z(0.0)],
            vec![0, 1, 2, 1, 3, 2],
        );
        let body = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        assert_eq!(body.node_count(), 4);
        assert_eq!(body.link_count(), 5);
        // Only the 0-3 diagonal pair is two hops apart.
        assert_eq!(body.bending_link_count(), 1);
    }

    #[test]
    fn split_vertices_are_welded() {
        let desc = SoftBodyDesc::from_mesh(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::X, Vec3::ONE.with_z(0.0), Vec3::Y],
            vec![0, 1, 2, 3, 4, 5],
        );
        let body = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        assert_eq!(body.node_count(), 4);
        assert_eq!(body.vertex_count(), 6);
        assert_eq!(body.node_of_vertex(3), body.node_of_vertex(1));
        assert_eq!(body.link_count(), 5);
    }

    #[test]
    fn bending_distance_below_two_has_no_bending_links() {
        let mut desc = grid_desc(3);
        desc.bending_distance = 1;
        let body = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        assert_eq!(body.bending_link_count(), 0);
        desc.bending_distance = 3;
        let wider = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        desc.bending_distance = 2;
        let narrow = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        assert!(wider.bending_link_count() > narrow.bending_link_count());
    }

    // ---- Mass ----

    #[test]
    fn mass_spread_over_free_nodes() {
        let mut desc = grid_desc(2);
        desc.pinned = vec![0];
        let body = SoftBody::new(&desc, Affine3A::IDENTITY, 8.0);
        assert!(body.is_pinned(0));
        assert_eq!(body.node_mass(0), Some(0.0));
        assert_relative_eq!(body.total_mass(), 8.0, max_relative = 1e-5);
    }

    // ---- Simulation ----

    #[test]
    fn pinned_nodes_stay_put() {
        let mut desc = grid_desc(4);
        desc.pinned = vec![0];
        let mut body = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        let start = body.node_position(0).unwrap();
        for _ in 0..50 {
            body.step(0.02, Vec3::new(0.0, 0.0, -9.8), &mut no_world);
        }
        assert_eq!(body.node_position(0), Some(start));
        assert!(body.center().z < 0.0);
    }

    #[test]
    fn links_hold_rest_length() {
        let desc = grid_desc(4);
        let mut body = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        body.add_node_force(0, Vec3::new(-500.0, 0.0, 0.0));
        body.step(0.02, Vec3::ZERO, &mut no_world);
        for link in body.links.iter().filter(|l| !l.bending) {
            let d = body.positions[link.a].distance(body.positions[link.b]);
            assert_relative_eq!(d, link.rest, max_relative = 0.25);
        }
    }

    #[test]
    fn collision_callback_stops_nodes() {
        let desc = grid_desc(3);
        let placed = Affine3A::from_translation(Vec3::new(0.0, 0.0, 10.0));
        let mut body = SoftBody::new(&desc, placed, 1.0);
        let mut floor = |p: Vec3, thickness: f32| {
            (p.z < thickness).then(|| (p.with_z(thickness), Vec3::Z))
        };
        for _ in 0..200 {
            body.step(0.02, Vec3::new(0.0, 0.0, -9.8), &mut floor);
        }
        assert!(body.world_aabb().min.z >= -1e-3);
        assert!(body.node_velocity(0).unwrap().z.abs() < 1.0);
    }

    #[test]
    fn wind_pushes_free_cloth() {
        let mut desc = grid_desc(2);
        desc.drag = 1.0;
        desc.wind_velocity = Vec3::new(100.0, 0.0, 0.0);
        let mut body = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        let before = body.center().x;
        for _ in 0..10 {
            body.step(0.02, Vec3::ZERO, &mut no_world);
        }
        assert!(body.center().x > before);
    }

    // ---- Mesh write-back ----

    #[test]
    fn write_back_in_local_space() {
        let mut mesh = TriMesh::grid("cloth", 100.0, 100.0, 2, 2);
        let desc = SoftBodyDesc::from_mesh(mesh.positions(), mesh.indices());
        let placement = Affine3A::from_translation(Vec3::new(500.0, 0.0, 0.0));
        let body = SoftBody::new(&desc, placement, 1.0);

        assert!(body.write_to_mesh(placement.inverse(), &mut mesh));
        for (written, original) in mesh.positions().iter().zip(desc.positions.iter()) {
            assert!((*written - *original).length() < 1e-2);
        }
        assert!(mesh.normals().iter().all(|n| n.z.abs() > 0.99));
        assert!(mesh.render_bounds().contains(Vec3::ZERO));
    }

    #[test]
    fn write_back_rejects_mismatched_mesh() {
        let desc = grid_desc(2);
        let body = SoftBody::new(&desc, Affine3A::IDENTITY, 1.0);
        let mut other = TriMesh::cuboid("box", Vec3::ONE);
        assert!(!body.write_to_mesh(Affine3A::IDENTITY, &mut other));
    }
}
