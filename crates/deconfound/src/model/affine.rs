use burn::module::Param;
use burn::prelude::*;
use burn::tensor::Distribution;

/// Configuration for a Kaiming-initialized affine layer.
#[derive(Config, Debug)]
pub struct AffineConfig {
    /// Input dimension.
    pub d_input: usize,
    /// Output dimension.
    pub d_output: usize,
}

/// Fully connected layer `y = x W^T + b`.
///
/// Weight is drawn from Kaiming (He) normal for a rectifier downstream,
/// bias starts at zero.
#[derive(Module, Debug)]
pub struct Affine<B: Backend> {
    /// Weight matrix, shape (d_output, d_input).
    pub(crate) weight: Param<Tensor<B, 2>>,
    /// Bias, shape (d_output,).
    pub(crate) bias: Param<Tensor<B, 1>>,
}

impl AffineConfig {
    /// Initialize an Affine layer.
    ///
    /// Weight ~ Normal(0, sqrt(2/fan_in)), bias = 0.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Affine<B> {
        let std_dev = (2.0 / self.d_input.max(1) as f64).sqrt();
        let weight = Tensor::random(
            [self.d_output, self.d_input],
            Distribution::Normal(0.0, std_dev),
            device,
        );

        Affine {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([self.d_output], device)),
        }
    }
}

impl<B: Backend> Affine<B> {
    /// Input shape `(batch, d_input)`, output shape `(batch, d_output)`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = input.matmul(self.weight.val().transpose());
        output + self.bias.val().unsqueeze_dim::<2>(0)
    }

    /// `[d_output, d_input]`.
    pub fn dims(&self) -> [usize; 2] {
        self.weight.val().dims()
    }
}
