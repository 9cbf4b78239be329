// End-to-end route scenarios through the navigation service

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use parking_lot::Mutex;

use pather::supplier::{chunk_file_name, write_chunk_file};
use pather::{
    ChunkKey, FileTriangleSupplier, MemoryTriangleSupplier, NavConfig, NavEvent, NavigationService, ScoreMode,
    SearchState, Surface, Triangle, TypeFlags, Vec3, WorldLocation, WorldMapAreas,
};

fn service_with(config: NavConfig, build: impl FnOnce(&mut MemoryTriangleSupplier)) -> NavigationService {
    let mut supplier = MemoryTriangleSupplier::new();
    build(&mut supplier);
    NavigationService::new(config, WorldMapAreas::default(), Arc::new(supplier))
}

fn corridor(s: &mut MemoryTriangleSupplier) {
    s.add_quad(0, (-10.0, -30.0), (110.0, 30.0), 0.0, TypeFlags::TERRAIN);
}

fn corridor_with_crate(s: &mut MemoryTriangleSupplier) {
    corridor(s);
    s.add_quad(0, (48.0, -6.0), (52.0, 6.0), 0.05, TypeFlags::MODEL);
}

fn inside_crate(p: &WorldLocation) -> bool {
    (48.0..=52.0).contains(&p.x) && p.y.abs() <= 6.0
}

fn quad(min: (f32, f32), max: (f32, f32), z: f32, flags: TypeFlags) -> [Triangle; 2] {
    let a = Vec3::new(min.0, min.1, z);
    let b = Vec3::new(max.0, min.1, z);
    let c = Vec3::new(max.0, max.1, z);
    let d = Vec3::new(min.0, max.1, z);
    [Triangle::new(a, b, c, flags), Triangle::new(a, c, d, flags)]
}

fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        files.insert(
            path.file_name().unwrap().to_string_lossy().into_owned(),
            std::fs::read(&path).unwrap(),
        );
    }
    files
}

#[test]
fn test_straight_corridor() {
    let mut nav = service_with(NavConfig::default(), corridor);
    let from = WorldLocation::new(0.0, 0.0, 0.0, 0);
    let to = WorldLocation::new(100.0, 0.0, 0.0, 0);

    let route = nav.find_route(from, to, ScoreMode::AStar).unwrap().unwrap();

    assert_eq!(route.first().copied(), Some(from));
    assert_eq!(route.last().copied(), Some(to));
    for p in &route {
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(p.z, 0.0, epsilon = 1e-4);
    }
    // Lattice steps of 3 up to the last spot inside arrival range, then the target
    assert_abs_diff_eq!(route[route.len() - 2].x, 99.0, epsilon = 1e-4);
    assert_eq!(nav.search_state(), SearchState::Resolved);
}

#[test]
fn test_no_data_means_no_route() {
    let mut nav = service_with(NavConfig::default(), corridor);
    let route = nav
        .find_route(
            WorldLocation::new(0.0, 0.0, 0.0, 5),
            WorldLocation::new(50.0, 0.0, 0.0, 5),
            ScoreMode::AStar,
        )
        .unwrap();
    assert!(route.is_none());
    assert_eq!(nav.search_state(), SearchState::Failed);
}

#[test]
fn test_corrupt_chunk_means_no_route() {
    let data = tempfile::tempdir().unwrap();
    let key = ChunkKey::containing(0, 12.0, 30.0, NavConfig::default().chunk_size);
    std::fs::write(data.path().join(chunk_file_name(key)), b"PTRI\x01\0\0\0garbage").unwrap();

    let mut nav = NavigationService::new(
        NavConfig::default(),
        WorldMapAreas::default(),
        Arc::new(FileTriangleSupplier::new(data.path())),
    );
    let route = nav
        .find_route(
            WorldLocation::new(12.0, 30.0, 0.0, 0),
            WorldLocation::new(90.0, 30.0, 0.0, 0),
            ScoreMode::AStar,
        )
        .unwrap();
    assert!(route.is_none());
    assert_eq!(nav.search_state(), SearchState::Failed);
    assert!(nav.resolve_z(WorldLocation::new(12.0, 30.0, 0.0, 0)).unwrap().is_none());
}

#[test]
fn test_avoid_models_detours() {
    let from = WorldLocation::new(0.0, 0.0, 0.0, 0);
    let to = WorldLocation::new(100.0, 0.0, 0.0, 0);

    let mut plain = service_with(NavConfig::default(), corridor_with_crate);
    let direct = plain.find_route(from, to, ScoreMode::AStar).unwrap().unwrap();
    assert!(direct.iter().any(inside_crate));

    let mut careful = service_with(NavConfig::default(), corridor_with_crate);
    let detour = careful.find_route(from, to, ScoreMode::AvoidModels).unwrap().unwrap();
    assert!(!detour.iter().any(inside_crate));
    assert_eq!(detour.last().copied(), Some(to));
}

#[test]
fn test_routes_are_deterministic() {
    let from = WorldLocation::new(0.0, 0.0, 0.0, 0);
    let to = WorldLocation::new(100.0, 12.0, 0.0, 0);

    let first = service_with(NavConfig::default(), corridor_with_crate)
        .find_route(from, to, ScoreMode::AvoidModels)
        .unwrap()
        .unwrap();
    let second = service_with(NavConfig::default(), corridor_with_crate)
        .find_route(from, to, ScoreMode::AvoidModels)
        .unwrap()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_water_above_ground_wins() {
    let mut nav = service_with(NavConfig::default(), |s| {
        corridor(s);
        s.add_quad(0, (20.0, -5.0), (30.0, 5.0), 0.8, TypeFlags::WATER);
    });

    let wet = nav.resolve_z(WorldLocation::new(25.0, 0.0, 0.0, 0)).unwrap().unwrap();
    assert_eq!(wet.surface, Surface::Water);
    assert_abs_diff_eq!(wet.z, 0.8, epsilon = 1e-4);

    let dry = nav.resolve_z(WorldLocation::new(10.0, 0.0, 0.0, 0)).unwrap().unwrap();
    assert_eq!(dry.surface, Surface::Terrain);
}

#[test]
fn test_route_event_published() {
    let mut nav = service_with(NavConfig::default(), corridor);
    let routes = Arc::new(Mutex::new(Vec::new()));
    let sink = routes.clone();
    nav.subscribe(Arc::new(move |e: &NavEvent| {
        if let NavEvent::PathCreated { points, .. } = e {
            sink.lock().push(points.len());
        }
    }));

    let route = nav
        .find_route(
            WorldLocation::new(0.0, 0.0, 0.0, 0),
            WorldLocation::new(30.0, 0.0, 0.0, 0),
            ScoreMode::AStar,
        )
        .unwrap()
        .unwrap();
    assert_eq!(*routes.lock(), vec![route.len()]);
}

#[test]
fn test_simplified_route_keeps_endpoints() {
    let config = NavConfig {
        simplify_tolerance: 0.5,
        ..NavConfig::default()
    };
    let mut nav = service_with(config, corridor);
    let from = WorldLocation::new(0.0, 0.0, 0.0, 0);
    let to = WorldLocation::new(100.0, 0.0, 0.0, 0);

    let route = nav.find_route(from, to, ScoreMode::AStar).unwrap().unwrap();
    assert_eq!(route, vec![from, to]);
}

#[test]
fn test_graph_persists_across_services() {
    let data = tempfile::tempdir().unwrap();
    let graphs = tempfile::tempdir().unwrap();

    let key = ChunkKey::containing(0, 12.0, 30.0, NavConfig::default().chunk_size);
    write_chunk_file(data.path(), key, &quad((5.0, 5.0), (120.0, 60.0), 0.0, TypeFlags::TERRAIN)).unwrap();

    let config = NavConfig {
        data_dir: data.path().to_path_buf(),
        graph_dir: Some(graphs.path().to_path_buf()),
        world_map_areas: data.path().join("WorldMapArea.json"),
        ..NavConfig::default()
    };
    let from = WorldLocation::new(12.0, 30.0, 0.0, 0);
    let to = WorldLocation::new(90.0, 30.0, 0.0, 0);

    let mut nav = NavigationService::from_config(config.clone()).unwrap();
    let first = nav.find_route(from, to, ScoreMode::AStar).unwrap().unwrap();
    assert!(nav.save().unwrap() > 0);

    let map_dir = graphs.path().join("000");
    let saved = snapshot(&map_dir);
    assert!(!saved.is_empty());

    // Nothing changed since the last save
    assert_eq!(nav.save().unwrap(), 0);
    assert_eq!(snapshot(&map_dir), saved);

    let mut reloaded = NavigationService::new(
        config.clone(),
        WorldMapAreas::default(),
        Arc::new(FileTriangleSupplier::new(config.data_dir.clone())),
    );
    let second = reloaded.find_route(from, to, ScoreMode::AStar).unwrap().unwrap();
    assert_eq!(first, second);
}
