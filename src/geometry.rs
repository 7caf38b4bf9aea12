/// カメラ空間の3次元ベクトル（メートル）
pub type Vector3 = nalgebra::Vector3<f32>;

const X: usize = 0;
const Y: usize = 1;
const Z: usize = 2;

/// 奥行き(Z)が負なら `min_depth` に置き換える
pub fn with_min_depth(v: &Vector3, min_depth: f32) -> Vector3 {
    if v.z < 0.0 {
        Vector3::new(v.x, v.y, min_depth)
    } else {
        *v
    }
}

/// b を頂点とする a←b→c の角度（ラジアン, 0..=π）
///
/// どちらかの辺の長さが0なら 0 を返す。
pub fn angle_3d(a: &Vector3, b: &Vector3, c: &Vector3) -> f32 {
    (a - b).angle(&(c - b))
}

fn angle_in_plane(a: &Vector3, b: &Vector3, c: &Vector3, dropped: usize) -> f32 {
    let mut ba = a - b;
    let mut bc = c - b;
    ba[dropped] = 0.0;
    bc[dropped] = 0.0;
    ba.angle(&bc)
}

/// XZ平面 (Y成分を0にした) 上の角度
pub fn angle_xz(a: &Vector3, b: &Vector3, c: &Vector3) -> f32 {
    angle_in_plane(a, b, c, Y)
}

/// XY平面 (Z成分を0にした) 上の角度
pub fn angle_xy(a: &Vector3, b: &Vector3, c: &Vector3) -> f32 {
    angle_in_plane(a, b, c, Z)
}

/// YZ平面 (X成分を0にした) 上の角度
pub fn angle_yz(a: &Vector3, b: &Vector3, c: &Vector3) -> f32 {
    angle_in_plane(a, b, c, X)
}
