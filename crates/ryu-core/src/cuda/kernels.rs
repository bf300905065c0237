// CUDA kernel source, compiled at device creation via NVRTC
//
// One compilation unit holding every f32 kernel of the device kernel
// library. Entry points follow the fixed calling conventions:
//
//   binary_<op>(const float* a, const float* b, float* out, unsigned int n)
//   unary_<op>(const float* inp, float* out, unsigned int n)
//   shift_<op>(const float* inp, float* out, unsigned int n, int shift)
//
// plus the data-movement kernels used by the dispatch layer. Matmul goes
// through cuBLAS and buffer copies through the driver, so neither has a
// kernel here.
//
// Numeric conventions match the host reference kernels: `rem` is fmodf,
// comparisons write 1.0f / 0.0f, bitwise operators and shifts act on the
// value truncated to int.

pub const MODULE_NAME: &str = "ryu";

pub const KERNEL_SOURCE: &str = r#"

#define ELEMENTWISE_INDEX                                      \
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;  \
    if (idx >= n) return;

#define BINARY_KERNEL(NAME, EXPR)                                                                   \
extern "C" __global__ void binary_##NAME(const float* a, const float* b, float* out, unsigned int n) { \
    ELEMENTWISE_INDEX                                                                               \
    float x = a[idx];                                                                               \
    float y = b[idx];                                                                               \
    out[idx] = (EXPR);                                                                              \
}

#define UNARY_KERNEL(NAME, EXPR)                                                      \
extern "C" __global__ void unary_##NAME(const float* inp, float* out, unsigned int n) { \
    ELEMENTWISE_INDEX                                                                 \
    float x = inp[idx];                                                               \
    out[idx] = (EXPR);                                                                \
}

//  FILL

extern "C" __global__ void fill(float* out, float val, unsigned int n) {
    ELEMENTWISE_INDEX
    out[idx] = val;
}

//  BINARY

BINARY_KERNEL(add, x + y)
BINARY_KERNEL(sub, x - y)
BINARY_KERNEL(mul, x * y)
BINARY_KERNEL(div, x / y)
BINARY_KERNEL(rem, fmodf(x, y))
BINARY_KERNEL(pow, powf(x, y))
BINARY_KERNEL(eq, x == y ? 1.0f : 0.0f)
BINARY_KERNEL(ne, x != y ? 1.0f : 0.0f)
BINARY_KERNEL(lt, x < y ? 1.0f : 0.0f)
BINARY_KERNEL(le, x <= y ? 1.0f : 0.0f)
BINARY_KERNEL(gt, x > y ? 1.0f : 0.0f)
BINARY_KERNEL(ge, x >= y ? 1.0f : 0.0f)
BINARY_KERNEL(bitand, (float)((int)x & (int)y))
BINARY_KERNEL(bitor, (float)((int)x | (int)y))
BINARY_KERNEL(bitxor, (float)((int)x ^ (int)y))

//  UNARY

UNARY_KERNEL(neg, -x)
UNARY_KERNEL(invert, (float)(~(int)x))
UNARY_KERNEL(abs, fabsf(x))
UNARY_KERNEL(exp, expf(x))
UNARY_KERNEL(log, logf(x))
UNARY_KERNEL(sqrt, sqrtf(x))

//  SHIFT

extern "C" __global__ void shift_shl(const float* inp, float* out, unsigned int n, int shift) {
    ELEMENTWISE_INDEX
    out[idx] = (float)((int)((unsigned int)(int)inp[idx] << shift));
}

extern "C" __global__ void shift_shr(const float* inp, float* out, unsigned int n, int shift) {
    ELEMENTWISE_INDEX
    out[idx] = (float)((int)inp[idx] >> shift);
}

//  DATA MOVEMENT

extern "C" __global__ void gather(const float* src, const unsigned int* index, float* out, unsigned int n) {
    ELEMENTWISE_INDEX
    out[idx] = src[index[idx]];
}

extern "C" __global__ void scatter(const float* src, const unsigned int* index, float* dst, unsigned int n) {
    ELEMENTWISE_INDEX
    dst[index[idx]] = src[idx];
}

// One thread per (outer, inner) output position, looping over the reduced axis.
extern "C" __global__ void reduce_sum(
    const float* inp, float* out,
    unsigned int outer_size, unsigned int reduce_size, unsigned int inner_size
) {
    unsigned int idx = blockIdx.x * blockDim.x + threadIdx.x;
    unsigned int total = outer_size * inner_size;
    if (idx >= total) return;
    unsigned int outer = idx / inner_size;
    unsigned int inner = idx % inner_size;
    float acc = 0.0f;
    for (unsigned int j = 0; j < reduce_size; j++) {
        acc += inp[(outer * reduce_size + j) * inner_size + inner];
    }
    out[idx] = acc;
}

"#;

pub const KERNEL_NAMES: &[&str] = &[
    "fill",
    "binary_add",
    "binary_sub",
    "binary_mul",
    "binary_div",
    "binary_rem",
    "binary_pow",
    "binary_eq",
    "binary_ne",
    "binary_lt",
    "binary_le",
    "binary_gt",
    "binary_ge",
    "binary_bitand",
    "binary_bitor",
    "binary_bitxor",
    "unary_neg",
    "unary_invert",
    "unary_abs",
    "unary_exp",
    "unary_log",
    "unary_sqrt",
    "shift_shl",
    "shift_shr",
    "gather",
    "scatter",
    "reduce_sum",
];
